//! Read-aloud support
//!
//! Playback goes through the [`SpeechPlayer`] trait so the host engine can be
//! swapped for a fake in tests. [`SystemSpeech`] drives the platform's
//! text-to-speech command; [`Narrator`] adds voice selection and the
//! one-message-at-a-time playback rules on top of any player.

use crate::state::MessageId;
use anyhow::{anyhow, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::{Child, Command, Stdio};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub name: String,
    /// BCP 47-ish language tag as reported by the engine (`en_US`, `en-gb`)
    pub lang: String,
    pub is_local: bool,
}

impl VoiceProfile {
    pub fn is_english(&self) -> bool {
        self.lang.to_ascii_lowercase().starts_with("en")
    }
}

/// First local English voice, else the first voice at all.
pub fn default_voice(voices: &[VoiceProfile]) -> Option<usize> {
    voices
        .iter()
        .position(|v| v.is_local && v.is_english())
        .or(if voices.is_empty() { None } else { Some(0) })
}

pub trait SpeechPlayer: Send {
    fn voices(&mut self) -> Result<Vec<VoiceProfile>>;
    /// Start speaking `text`, replacing whatever is playing.
    fn speak(&mut self, text: &str, voice: Option<&VoiceProfile>) -> Result<()>;
    fn cancel(&mut self);
    fn is_playing(&mut self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEngine {
    /// macOS `say`
    Say,
    /// `espeak-ng` (Linux and others)
    Espeak,
}

impl SpeechEngine {
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            SpeechEngine::Say
        } else {
            SpeechEngine::Espeak
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            SpeechEngine::Say => "say",
            SpeechEngine::Espeak => "espeak-ng",
        }
    }

    fn list_args(&self) -> &'static [&'static str] {
        match self {
            SpeechEngine::Say => &["-v", "?"],
            SpeechEngine::Espeak => &["--voices"],
        }
    }

    /// Arguments that make the engine read the utterance from stdin
    fn stdin_args(&self) -> &'static [&'static str] {
        match self {
            SpeechEngine::Say => &["-f", "-"],
            SpeechEngine::Espeak => &["--stdin"],
        }
    }

    fn voice_arg<'a>(&self, voice: &'a VoiceProfile) -> &'a str {
        match self {
            SpeechEngine::Say => voice.name.as_str(),
            SpeechEngine::Espeak => voice.lang.as_str(),
        }
    }

    /// Parse the engine's voice listing.
    pub fn parse_voices(&self, listing: &str) -> Result<Vec<VoiceProfile>> {
        match self {
            SpeechEngine::Say => parse_say_voices(listing),
            SpeechEngine::Espeak => Ok(parse_espeak_voices(listing)),
        }
    }
}

// `Alex                en_US    # Most people recognize me by my voice.`
fn parse_say_voices(listing: &str) -> Result<Vec<VoiceProfile>> {
    let pattern = Regex::new(r"^(?P<name>.+?)\s+(?P<lang>[a-z]{2,3}[_-][A-Za-z0-9]+)\s+#")?;

    Ok(listing
        .lines()
        .filter_map(|line| pattern.captures(line))
        .map(|caps| VoiceProfile {
            name: caps["name"].trim().to_string(),
            lang: caps["lang"].to_string(),
            is_local: true,
        })
        .collect())
}

// ` 5  en-us           --/M      English_(America)  gmw/en-US            (en 10)`
fn parse_espeak_voices(listing: &str) -> Vec<VoiceProfile> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            Some(VoiceProfile {
                name: fields[3].replace('_', " "),
                lang: fields[1].to_string(),
                is_local: true,
            })
        })
        .collect()
}

/// Host text-to-speech through a child process.
pub struct SystemSpeech {
    engine: SpeechEngine,
    child: Option<Child>,
}

impl SystemSpeech {
    pub fn new(engine: SpeechEngine) -> Self {
        Self { engine, child: None }
    }

    pub fn detect() -> Self {
        Self::new(SpeechEngine::detect())
    }
}

impl SpeechPlayer for SystemSpeech {
    fn voices(&mut self) -> Result<Vec<VoiceProfile>> {
        let output = Command::new(self.engine.program())
            .args(self.engine.list_args())
            .output()?;

        if !output.status.success() {
            return Err(anyhow!(
                "{} voice listing failed with status: {}",
                self.engine.program(),
                output.status
            ));
        }

        self.engine.parse_voices(&String::from_utf8_lossy(&output.stdout))
    }

    fn speak(&mut self, text: &str, voice: Option<&VoiceProfile>) -> Result<()> {
        self.cancel();

        let mut command = Command::new(self.engine.program());
        if let Some(voice) = voice {
            command.arg("-v").arg(self.engine.voice_arg(voice));
        }
        let child = command
            .args(self.engine.stdin_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        // Tracked before feeding so a failed write still gets killed and reaped
        let child = self.child.insert(child);
        if let Err(err) = feed_stdin(child, text) {
            self.cancel();
            return Err(err);
        }
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn is_playing(&mut self) -> bool {
        let running = matches!(
            self.child.as_mut().map(|child| child.try_wait()),
            Some(Ok(None))
        );
        if !running {
            self.child = None;
        }
        running
    }
}

/// Write `text` to the child's stdin on a separate thread.
///
/// Long replies exceed the pipe buffer, so the write can only finish as the
/// engine reads. Dropping stdin at the end closes it and the engine speaks.
fn feed_stdin(child: &mut Child, text: &str) -> Result<()> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("speech engine has no stdin"))?;
    let text = text.to_string();

    std::thread::Builder::new()
        .name("speech-stdin".to_string())
        .spawn(move || {
            if let Err(err) = stdin.write_all(text.as_bytes()) {
                debug!(error = %err, "speech engine stopped reading");
            }
        })?;
    Ok(())
}

impl Drop for SystemSpeech {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Voice selection plus exclusive, per-message playback
pub struct Narrator {
    player: Box<dyn SpeechPlayer>,
    voices: Option<Vec<VoiceProfile>>,
    selected: Option<usize>,
    speaking: Option<MessageId>,
}

impl Narrator {
    pub fn new(player: Box<dyn SpeechPlayer>) -> Self {
        Self {
            player,
            voices: None,
            selected: None,
            speaking: None,
        }
    }

    // Voices are enumerated at most once per session
    fn load_voices(&mut self) {
        if self.voices.is_some() {
            return;
        }
        let voices = match self.player.voices() {
            Ok(voices) => voices,
            Err(err) => {
                debug!(error = %err, "voice enumeration failed");
                Vec::new()
            }
        };
        self.selected = default_voice(&voices);
        self.voices = Some(voices);
    }

    pub fn voices(&mut self) -> &[VoiceProfile] {
        self.load_voices();
        self.voices.as_deref().unwrap_or_default()
    }

    pub fn selected_index(&mut self) -> Option<usize> {
        self.load_voices();
        self.selected
    }

    pub fn selected_voice(&mut self) -> Option<&VoiceProfile> {
        self.load_voices();
        let index = self.selected?;
        self.voices.as_ref()?.get(index)
    }

    pub fn select_voice(&mut self, index: usize) -> Option<&VoiceProfile> {
        self.load_voices();
        if index < self.voices().len() {
            self.selected = Some(index);
        }
        self.selected_voice()
    }

    /// Select a voice by name; returns false when no such voice exists.
    pub fn select_voice_by_name(&mut self, name: &str) -> bool {
        match self.voices().iter().position(|v| v.name == name) {
            Some(index) => {
                self.selected = Some(index);
                true
            }
            None => false,
        }
    }

    pub fn speaking(&self) -> Option<MessageId> {
        self.speaking
    }

    pub fn is_speaking(&self, id: MessageId) -> bool {
        self.speaking == Some(id)
    }

    /// Play `text` for message `id`, or stop it when it is the one playing.
    ///
    /// Returns whether the message is playing afterwards. Starting a message
    /// cancels any other one. Failures are not reported beyond a debug log.
    pub fn toggle(&mut self, id: MessageId, text: &str) -> bool {
        if self.is_speaking(id) {
            self.stop();
            return false;
        }

        self.player.cancel();
        let voice = self.selected_voice().cloned();
        match self.player.speak(text, voice.as_ref()) {
            Ok(()) => {
                self.speaking = Some(id);
                true
            }
            Err(err) => {
                debug!(error = %err, "speech playback failed");
                self.speaking = None;
                false
            }
        }
    }

    pub fn stop(&mut self) {
        self.player.cancel();
        self.speaking = None;
    }

    /// Clear the playing marker once the player has finished on its own.
    pub fn refresh(&mut self) {
        if self.speaking.is_some() && !self.player.is_playing() {
            self.speaking = None;
        }
    }
}
