use std::path::PathBuf;
use assistant_core::clipboard::copy_message;
use assistant_core::export::{export_transcript, message_plain_text};
use assistant_core::{
    Attachment, BackendClient, ChatMessage, ChatSession, ClipboardWriter, Config, DirectorySink,
    Draft, Narrator, SendOutcome, SystemClipboard, SystemSpeech, TranscriptSink,
};
use chrono::Local;
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
    /// Typing the path of a document to attach
    AttachPath,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Composer state
    pub input: String,
    pub input_cursor: usize, // cursor position in input, in chars
    pub attach_input: String,
    pub attachment: Option<Attachment>,

    // Conversation state
    pub session: ChatSession,
    pub selected_message: Option<usize>,
    pub chat_scroll: u16,
    pub chat_height: u16,      // Inner height of chat area for scroll calculations
    pub total_chat_lines: u16, // Wrapped line count of the last render
    pub follow_tail: bool,     // Keep the newest message in view
    pub scroll_to_selection: bool,
    pub chat_area: Option<Rect>,

    // Host capabilities
    pub narrator: Narrator,
    pub clipboard: Box<dyn ClipboardWriter>,
    pub sink: Box<dyn TranscriptSink>,

    // Voice picker state
    pub show_voice_picker: bool,
    pub voice_picker_state: ListState,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub status: Option<String>,
    pub config: Config,
    /// Where `config` is saved; `None` leaves the file alone
    pub config_path: Option<PathBuf>,
}

impl App {
    pub fn new(config: Config, config_path: Option<PathBuf>, backend_url: &str) -> Self {
        let sink = DirectorySink::default_location(config.download_dir.as_deref());
        let mut app = Self::with_capabilities(
            config,
            BackendClient::new(backend_url),
            Narrator::new(Box::new(SystemSpeech::detect())),
            Box::new(SystemClipboard::new()),
            Box::new(sink),
        );
        app.config_path = config_path;
        app
    }

    pub fn with_capabilities(
        config: Config,
        client: BackendClient,
        mut narrator: Narrator,
        clipboard: Box<dyn ClipboardWriter>,
        sink: Box<dyn TranscriptSink>,
    ) -> Self {
        if let Some(name) = config.preferred_voice.as_deref() {
            if !narrator.select_voice_by_name(name) {
                warn!(voice = name, "preferred voice not available");
            }
        }

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            input: String::new(),
            input_cursor: 0,
            attach_input: String::new(),
            attachment: None,

            session: ChatSession::new(client),
            selected_message: None,
            chat_scroll: 0,
            chat_height: 0,
            total_chat_lines: 0,
            follow_tail: true,
            scroll_to_selection: false,
            chat_area: None,

            narrator,
            clipboard,
            sink,

            show_voice_picker: false,
            voice_picker_state: ListState::default(),

            animation_frame: 0,

            status: None,
            config,
            config_path: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.session.is_loading()
    }

    /// Whether the send action is enabled
    pub fn can_send(&self) -> bool {
        !self.is_loading() && (!self.input.trim().is_empty() || self.attachment.is_some())
    }

    /// Send the composed prompt or attachment. Inert while a reply is pending.
    pub fn send_draft(&mut self) -> SendOutcome {
        if self.is_loading() {
            return SendOutcome::Busy;
        }

        let draft = Draft {
            prompt: self.input.clone(),
            attachment: self.attachment.clone(),
        };
        let outcome = self.session.send(draft);
        if let SendOutcome::Sent(_) = outcome {
            self.input.clear();
            self.input_cursor = 0;
            self.attachment = None;
            self.selected_message = None;
            self.follow_tail = true;
            self.status = None;
        }
        outcome
    }

    /// Called on every Tick event
    pub async fn tick(&mut self) {
        if self.session.poll_response().await.is_some() {
            self.follow_tail = true;
        }
        self.narrator.refresh();
        if self.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Message the copy/speak actions apply to: the selection, else the last reply
    pub fn target_message(&self) -> Option<&ChatMessage> {
        let transcript = self.session.transcript();
        match self.selected_message {
            Some(i) => transcript.messages().get(i),
            None => transcript.last_reply(),
        }
    }

    pub fn copy_target(&mut self) {
        let Some(message) = self.target_message().cloned() else {
            return;
        };
        if copy_message(self.clipboard.as_mut(), &message) {
            self.status = Some("Copied to clipboard".to_string());
        }
    }

    pub fn speak_target(&mut self) {
        let Some(message) = self.target_message().cloned() else {
            return;
        };
        let text = message_plain_text(&message);
        self.narrator.toggle(message.id(), &text);
    }

    pub fn download_transcript(&mut self) {
        match export_transcript(self.session.transcript(), self.sink.as_mut(), Local::now()) {
            Ok(path) => self.status = Some(format!("Saved transcript to {}", path.display())),
            Err(err) => {
                warn!(error = %err, "transcript download failed");
                self.status = Some(err.to_string());
            }
        }
    }

    // Attachment actions
    pub fn start_attach(&mut self) {
        self.attach_input.clear();
        self.input_mode = InputMode::AttachPath;
    }

    pub fn attach_from_input(&mut self) {
        let path = expand_home(self.attach_input.trim());
        match Attachment::load(&path) {
            Ok(attachment) => {
                self.status = Some(format!(
                    "Attached {} ({})",
                    attachment.name(),
                    attachment.size_label()
                ));
                self.attachment = Some(attachment);
                self.input_mode = InputMode::Editing;
            }
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    pub fn remove_attachment(&mut self) {
        if self.attachment.take().is_some() {
            self.status = Some("Attachment removed".to_string());
        }
    }

    // Voice picker
    pub fn open_voice_picker(&mut self) {
        if self.narrator.voices().is_empty() {
            self.status = Some("No text-to-speech voices available".to_string());
            return;
        }
        let current = self.narrator.selected_index().unwrap_or(0);
        self.voice_picker_state.select(Some(current));
        self.show_voice_picker = true;
    }

    pub fn voice_picker_down(&mut self) {
        let len = self.narrator.voices().len();
        if len > 0 {
            let i = self.voice_picker_state.selected().unwrap_or(0);
            self.voice_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn voice_picker_up(&mut self) {
        let i = self.voice_picker_state.selected().unwrap_or(0);
        self.voice_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn choose_voice(&mut self) {
        self.show_voice_picker = false;
        let Some(index) = self.voice_picker_state.selected() else {
            return;
        };
        let Some(name) = self.narrator.select_voice(index).map(|v| v.name.clone()) else {
            return;
        };

        self.config.preferred_voice = Some(name.clone());
        if let Some(path) = self.config_path.as_deref() {
            if let Err(err) = self.config.save_to(path) {
                warn!(error = %err, "could not save preferred voice");
            }
        }
        self.status = Some(format!("Voice: {}", name));
    }

    // Message selection
    pub fn select_next_message(&mut self) {
        let len = self.session.transcript().len();
        if len == 0 {
            return;
        }
        let next = match self.selected_message {
            Some(i) => (i + 1).min(len - 1),
            None => len - 1,
        };
        self.selected_message = Some(next);
        self.follow_tail = false;
        self.scroll_to_selection = true;
    }

    pub fn select_prev_message(&mut self) {
        let len = self.session.transcript().len();
        if len == 0 {
            return;
        }
        let prev = match self.selected_message {
            Some(i) => i.saturating_sub(1),
            None => len - 1,
        };
        self.selected_message = Some(prev);
        self.follow_tail = false;
        self.scroll_to_selection = true;
    }

    pub fn select_first_message(&mut self) {
        if !self.session.transcript().is_empty() {
            self.selected_message = Some(0);
            self.follow_tail = false;
            self.chat_scroll = 0;
        }
    }

    pub fn select_last_message(&mut self) {
        let len = self.session.transcript().len();
        self.selected_message = len.checked_sub(1);
        self.follow_tail = true;
    }

    pub fn clear_selection(&mut self) {
        self.selected_message = None;
    }

    // Scrolling
    fn max_scroll(&self) -> u16 {
        self.total_chat_lines.saturating_sub(self.chat_height)
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_scroll());
        self.follow_tail = self.chat_scroll >= self.max_scroll();
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_tail = false;
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down((self.chat_height / 2).max(1));
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up((self.chat_height / 2).max(1));
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use assistant_core::{SpeechPlayer, VoiceProfile};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct SilentSpeech;

    impl SpeechPlayer for SilentSpeech {
        fn voices(&mut self) -> Result<Vec<VoiceProfile>> {
            Ok(Vec::new())
        }
        fn speak(&mut self, _text: &str, _voice: Option<&VoiceProfile>) -> Result<()> {
            Ok(())
        }
        fn cancel(&mut self) {}
        fn is_playing(&mut self) -> bool {
            true
        }
    }

    struct TwoVoices;

    impl SpeechPlayer for TwoVoices {
        fn voices(&mut self) -> Result<Vec<VoiceProfile>> {
            Ok(vec![
                VoiceProfile {
                    name: "Daniel".to_string(),
                    lang: "en_GB".to_string(),
                    is_local: true,
                },
                VoiceProfile {
                    name: "Amelie".to_string(),
                    lang: "fr_CA".to_string(),
                    is_local: true,
                },
            ])
        }
        fn speak(&mut self, _text: &str, _voice: Option<&VoiceProfile>) -> Result<()> {
            Ok(())
        }
        fn cancel(&mut self) {}
        fn is_playing(&mut self) -> bool {
            false
        }
    }

    struct SharedClipboard(Arc<Mutex<Option<String>>>);

    impl ClipboardWriter for SharedClipboard {
        fn write_text(&mut self, text: &str) -> Result<()> {
            *self.0.lock().map_err(|_| anyhow!("poisoned"))? = Some(text.to_string());
            Ok(())
        }
    }

    fn test_app(url: &str, download_dir: &Path) -> (App, Arc<Mutex<Option<String>>>) {
        let copied = Arc::new(Mutex::new(None));
        let app = App::with_capabilities(
            Config::new(),
            BackendClient::new(url),
            Narrator::new(Box::new(SilentSpeech)),
            Box::new(SharedClipboard(Arc::clone(&copied))),
            Box::new(DirectorySink::new(download_dir)),
        );
        (app, copied)
    }

    async fn slow_server(reply: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(format!(r#"{{"response":"{}"}}"#, reply), "application/json")
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_send_is_disabled_while_in_flight() {
        let server = slow_server("first reply").await;
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _) = test_app(&server.uri(), dir.path());

        app.input = "hello".to_string();
        assert!(app.can_send());
        assert!(matches!(app.send_draft(), SendOutcome::Sent(_)));
        assert!(app.input.is_empty());

        app.input = "again".to_string();
        assert!(!app.can_send());
        assert_eq!(app.send_draft(), SendOutcome::Busy);
        assert_eq!(app.input, "again");
        assert_eq!(app.session.transcript().len(), 1);

        app.session.wait_for_response().await;
        assert!(app.can_send());
        assert_eq!(app.session.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_copy_and_download_target_last_reply() {
        let server = slow_server("**answer**").await;
        let dir = tempfile::tempdir().unwrap();
        let (mut app, copied) = test_app(&server.uri(), dir.path());

        app.input = "question".to_string();
        app.send_draft();
        app.session.wait_for_response().await;

        app.copy_target();
        assert_eq!(copied.lock().unwrap().as_deref(), Some("**answer**"));

        app.download_transcript();
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert!(app.status.as_deref().unwrap_or_default().starts_with("Saved transcript"));
    }

    #[tokio::test]
    async fn test_speak_toggles_selected_message() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _) = test_app("http://127.0.0.1:9", dir.path());
        assert!(app.target_message().is_none());

        app.attachment = Some(Attachment::new("a.txt", b"text".to_vec()).unwrap());
        app.send_draft();
        app.select_last_message();
        let id = app.target_message().map(|m| m.id()).unwrap();

        app.speak_target();
        assert!(app.narrator.is_speaking(id));
        app.speak_target();
        assert!(!app.narrator.is_speaking(id));
    }

    #[test]
    fn test_choose_voice_writes_config_only_when_path_known() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let voiced_app = |path: Option<PathBuf>| {
            let mut app = App::with_capabilities(
                Config::new(),
                BackendClient::new("http://127.0.0.1:9"),
                Narrator::new(Box::new(TwoVoices)),
                Box::new(SharedClipboard(Arc::new(Mutex::new(None)))),
                Box::new(DirectorySink::new(dir.path())),
            );
            app.config_path = path;
            app
        };

        // Config that failed to load: the choice is kept in memory only
        let mut app = voiced_app(None);
        app.open_voice_picker();
        app.voice_picker_down();
        app.choose_voice();
        assert_eq!(app.config.preferred_voice.as_deref(), Some("Amelie"));
        assert!(!config_path.exists());

        let mut app = voiced_app(Some(config_path.clone()));
        app.open_voice_picker();
        app.voice_picker_down();
        app.choose_voice();
        let saved = Config::load_from(&config_path).unwrap();
        assert_eq!(saved.preferred_voice.as_deref(), Some("Amelie"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/tmp/a.pdf"), PathBuf::from("/tmp/a.pdf"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/doc.txt"), home.join("doc.txt"));
        }
    }
}
