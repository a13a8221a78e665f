//! Offline replies chosen by keyword matching.
//!
//! Used whenever the remote completion endpoint is unavailable. Rules are
//! checked in declaration order and the first rule with a keyword contained in
//! the lowercased input wins, so later rules never see overlapping keywords.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};

/// Inputs longer than this (in characters) get the "too long" reply.
const LONG_MESSAGE_CHARS: usize = 100;

/// A keyword set and the replies it selects from.
#[derive(Debug)]
pub struct Rule {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub responses: &'static [&'static str],
}

pub const RULES: &[Rule] = &[
    Rule {
        name: "greeting",
        keywords: &["oi", "olá", "hello", "hi"],
        responses: &[
            "Olá! Como posso ajudá-lo hoje?",
            "Oi! Em que posso ser útil?",
            "Olá! Estou aqui para ajudar!",
        ],
    },
    Rule {
        name: "wellbeing",
        keywords: &["como você está", "tudo bem", "como vai"],
        responses: &[
            "Estou funcionando perfeitamente! E você, como está?",
            "Tudo ótimo por aqui! Como posso ajudá-lo?",
            "Estou bem e pronto para ajudar!",
        ],
    },
    Rule {
        name: "thanks",
        keywords: &["obrigado", "obrigada", "valeu", "thanks"],
        responses: &[
            "De nada! Fico feliz em ajudar!",
            "Por nada! Estou sempre aqui quando precisar!",
            "Foi um prazer ajudar!",
        ],
    },
    Rule {
        name: "farewell",
        keywords: &["tchau", "bye", "até logo", "adeus"],
        responses: &[
            "Até logo! Foi um prazer conversar!",
            "Tchau! Volte sempre que precisar!",
            "Até mais! Estarei aqui quando precisar!",
        ],
    },
    Rule {
        name: "identity",
        keywords: &["nome", "quem é você", "who are you"],
        responses: &[
            "Eu sou sua assistente de IA pessoal!",
            "Sou uma inteligência artificial criada para ajudá-lo!",
            "Meu nome é IA Assistant, sua assistente virtual!",
        ],
    },
    Rule {
        name: "help",
        keywords: &["ajuda", "help", "socorro"],
        responses: &[
            "Claro! Posso ajudar com perguntas, conversas, informações e muito mais. O que você gostaria de saber?",
            "Estou aqui para ajudar! Pode me fazer perguntas sobre diversos assuntos.",
            "Como posso ajudá-lo? Posso conversar sobre vários temas!",
        ],
    },
];

pub const OFFLINE_QUESTION_REPLY: &str = "Essa é uma pergunta interessante! Infelizmente, no momento estou funcionando offline e minhas respostas são limitadas. Para respostas mais completas, configure uma chave de API no código. Posso ajudar com algo mais básico?";

pub const OFFLINE_TOO_LONG_REPLY: &str = "Entendi sua mensagem! Como estou funcionando offline, minhas respostas são limitadas. Para conversas mais avançadas, configure uma API de IA no aplicativo. Posso ajudar com algo mais simples?";

/// Templates for unmatched input; `{}` is replaced by the original text.
pub const ECHO_TEMPLATES: &[&str] = &[
    "Interessante! Você disse: \"{}\". Como estou em modo offline, minhas respostas são básicas. Configure uma API para respostas mais inteligentes!",
    "Entendi! Sobre \"{}\" - no momento estou funcionando com respostas pré-programadas. Para conversas mais avançadas, adicione uma chave de API!",
    "Compreendo sua mensagem sobre \"{}\". Estou funcionando offline no momento. Para respostas mais elaboradas, configure uma API de IA!",
];

/// Which part of the algorithm handles a given input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Index into [`RULES`].
    Rule(usize),
    Question,
    TooLong,
    Echo,
}

impl Branch {
    /// Every reply this branch can produce for `text`.
    pub fn candidates(&self, text: &str) -> Vec<String> {
        match self {
            Branch::Rule(idx) => RULES[*idx].responses.iter().map(|r| r.to_string()).collect(),
            Branch::Question => vec![OFFLINE_QUESTION_REPLY.to_string()],
            Branch::TooLong => vec![OFFLINE_TOO_LONG_REPLY.to_string()],
            Branch::Echo => ECHO_TEMPLATES.iter().map(|t| echo(t, text)).collect(),
        }
    }
}

fn echo(template: &str, text: &str) -> String {
    template.replacen("{}", text, 1)
}

/// Decide which branch answers `text` without picking a reply.
pub fn classify(text: &str) -> Branch {
    let lower = text.to_lowercase();

    if let Some(idx) = RULES
        .iter()
        .position(|rule| rule.keywords.iter().any(|k| lower.contains(k)))
    {
        return Branch::Rule(idx);
    }

    if lower.contains('?') {
        Branch::Question
    } else if lower.chars().count() > LONG_MESSAGE_CHARS {
        Branch::TooLong
    } else {
        Branch::Echo
    }
}

/// Produces a reply locally, with no I/O. Must always return a non-empty string.
pub trait Resolver: Send + Sync {
    fn resolve(&self, text: &str) -> String;
}

/// Keyword-matching resolver with an injectable random source.
pub struct PatternResolver {
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl PatternResolver {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Use a specific random source, e.g. a seeded one to pin the variant.
    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
        }
    }

    fn pick<'a>(&self, options: &'a [&'static str]) -> &'a str {
        // A poisoned lock only means another caller panicked mid-pick
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        options.choose(&mut **rng).copied().unwrap_or(OFFLINE_QUESTION_REPLY)
    }
}

impl Default for PatternResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for PatternResolver {
    fn resolve(&self, text: &str) -> String {
        match classify(text) {
            Branch::Rule(idx) => self.pick(RULES[idx].responses).to_string(),
            Branch::Question => OFFLINE_QUESTION_REPLY.to_string(),
            Branch::TooLong => OFFLINE_TOO_LONG_REPLY.to_string(),
            Branch::Echo => echo(self.pick(ECHO_TEMPLATES), text),
        }
    }
}
