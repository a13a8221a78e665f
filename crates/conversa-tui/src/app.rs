use std::sync::Arc;

use anyhow::Result;
use conversa_core::{
    clear_all_data, Completer, Config, FileStore, OpenAIClient, PatternResolver, Reply, Responder,
    Session, Settings,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Modal dialogs drawn on top of the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popup {
    None,
    ConfirmClearChat,
    ConfirmClearAll,
    Settings,
    Alert { title: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    ApiKey,
    DarkMode,
    VoiceEnabled,
    AutoSave,
}

impl SettingsField {
    const ORDER: [SettingsField; 4] = [
        SettingsField::ApiKey,
        SettingsField::DarkMode,
        SettingsField::VoiceEnabled,
        SettingsField::AutoSave,
    ];

    pub fn next(self) -> Self {
        let idx = Self::ORDER.iter().position(|f| *f == self).unwrap_or(0);
        Self::ORDER[(idx + 1) % Self::ORDER.len()]
    }

    pub fn prev(self) -> Self {
        let idx = Self::ORDER.iter().position(|f| *f == self).unwrap_or(0);
        Self::ORDER[(idx + Self::ORDER.len() - 1) % Self::ORDER.len()]
    }
}

/// Editable copy of the settings; only written back on save.
#[derive(Debug, Clone)]
pub struct SettingsForm {
    pub values: Settings,
    pub field: SettingsField,
    pub api_key_cursor: usize,
}

impl SettingsForm {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            values: settings.clone(),
            field: SettingsField::ApiKey,
            api_key_cursor: settings.api_key.chars().count(),
        }
    }

    pub fn toggle(&mut self) {
        match self.field {
            SettingsField::ApiKey => {}
            SettingsField::DarkMode => self.values.dark_mode = !self.values.dark_mode,
            SettingsField::VoiceEnabled => self.values.voice_enabled = !self.values.voice_enabled,
            SettingsField::AutoSave => self.values.auto_save = !self.values.auto_save,
        }
    }
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub popup: Popup,

    pub config: Config,
    pub store: Arc<FileStore>,
    pub settings: Settings,
    pub settings_form: SettingsForm,
    pub session: Session,

    // Chat input
    pub input: String,
    pub cursor: usize,

    // Chat view
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub follow_bottom: bool,

    // In-flight reply
    pub reply_task: Option<JoinHandle<Reply>>,
    pending_prompt: Option<String>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(FileStore::new(config.data_dir()?));
        let settings = Settings::load(store.as_ref()).await;

        let completer = build_completer(&config, &settings);
        let responder = Responder::new(completer, Arc::new(PatternResolver::new()));
        info!(remote = responder.has_remote(), "starting session");
        let session = Session::load(store.clone(), responder).await;

        Ok(Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            popup: Popup::None,

            settings_form: SettingsForm::from_settings(&settings),
            config,
            store,
            settings,
            session,

            input: String::new(),
            cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_bottom: true,

            reply_task: None,
            pending_prompt: None,

            animation_frame: 0,
        })
    }

    pub fn is_loading(&self) -> bool {
        self.session.is_busy()
    }

    pub fn is_online(&self) -> bool {
        self.session.responder().has_remote()
    }

    /// Send the input line. Blank input and input while a reply is pending are ignored.
    pub async fn submit_input(&mut self) {
        let text = self.input.clone();
        let Some(exchange) = self.session.begin(&text).await else {
            return;
        };

        self.input.clear();
        self.cursor = 0;
        self.follow_bottom = true;
        self.pending_prompt = Some(exchange.prompt.clone());

        let responder = self.session.responder();
        self.reply_task = Some(tokio::spawn(async move { responder.reply(&exchange).await }));
    }

    /// Record the reply once the background task is done.
    pub async fn poll_reply(&mut self) {
        let finished = self
            .reply_task
            .as_ref()
            .is_some_and(|task| task.is_finished());
        if !finished {
            return;
        }
        let Some(task) = self.reply_task.take() else {
            return;
        };

        let reply = match task.await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "reply task failed, using offline reply");
                let prompt = self.pending_prompt.as_deref().unwrap_or_default();
                self.session.responder().fallback(prompt)
            }
        };
        self.pending_prompt = None;
        self.session.finish(reply).await;
        self.follow_bottom = true;
    }

    pub fn open_clear_chat(&mut self) {
        if self.session.request_clear() {
            self.popup = Popup::ConfirmClearChat;
        }
    }

    pub async fn resolve_clear_chat(&mut self, confirmed: bool) {
        if confirmed {
            self.session.confirm_clear().await;
            self.chat_scroll = 0;
        } else {
            self.session.cancel_clear();
        }
        self.popup = Popup::None;
    }

    pub fn open_settings(&mut self) {
        self.settings_form = SettingsForm::from_settings(&self.settings);
        self.popup = Popup::Settings;
    }

    pub async fn save_settings(&mut self) {
        let updated = self.settings_form.values.clone();
        match updated.save(self.store.as_ref()).await {
            Ok(()) => {
                self.settings = updated;
                self.session.reconfigure(build_completer(&self.config, &self.settings));
                self.alert("Sucesso", "Configurações salvas com sucesso!");
            }
            Err(e) => {
                warn!(error = %e, "could not save settings");
                self.alert("Erro", "Não foi possível salvar as configurações");
            }
        }
    }

    pub fn open_clear_all(&mut self) {
        if !self.session.is_busy() {
            self.popup = Popup::ConfirmClearAll;
        }
    }

    pub async fn resolve_clear_all(&mut self, confirmed: bool) {
        self.popup = Popup::None;
        if !confirmed {
            return;
        }

        match clear_all_data(self.store.as_ref()).await {
            Ok(()) => {
                self.settings = Settings::default();
                self.settings_form = SettingsForm::from_settings(&self.settings);
                self.session.start_fresh();
                self.session.reconfigure(build_completer(&self.config, &self.settings));
                self.chat_scroll = 0;
                self.alert("Sucesso", "Dados limpos com sucesso!");
            }
            Err(e) => {
                warn!(error = %e, "could not clear data");
                self.alert("Erro", "Não foi possível limpar os dados");
            }
        }
    }

    pub fn alert(&mut self, title: &str, message: &str) {
        self.popup = Popup::Alert {
            title: title.to_string(),
            message: message.to_string(),
        };
    }

    pub fn tick_animation(&mut self) {
        if self.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1).min(self.max_scroll());
        self.follow_bottom = self.chat_scroll >= self.max_scroll();
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
        self.follow_bottom = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_scroll();
        self.follow_bottom = true;
    }

    /// Wrapped line count of the chat, used to keep the newest message visible.
    pub fn chat_line_count(&self) -> usize {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let wrapped = |line: &str| line.chars().count().max(1).div_ceil(wrap_width);

        let mut total = 0;
        for msg in self.session.messages() {
            total += 1; // author line
            total += msg.text.lines().map(wrapped).sum::<usize>().max(1);
            total += 1; // spacer
        }
        if self.is_loading() {
            total += 2;
        }
        total
    }

    pub fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 {
            self.chat_height as usize
        } else {
            20
        };
        self.chat_line_count().saturating_sub(visible_height) as u16
    }
}

/// Remote completer for the current key, or `None` to stay offline.
fn build_completer(config: &Config, settings: &Settings) -> Option<Arc<dyn Completer>> {
    let completion = config.completion(settings.api_key());
    if !completion.is_configured() {
        return None;
    }

    match OpenAIClient::new(completion) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!(error = %e, "could not build completion client, staying offline");
            None
        }
    }
}
