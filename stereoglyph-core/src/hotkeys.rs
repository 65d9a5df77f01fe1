//! Global hotkeys via evdev
//!
//! Reads keyboards from `/dev/input/event*` on a background thread and turns
//! configured key chords into [`ControlCommand`]s for the pacing loop.
//! Needs read access to the input devices (usually the `input` group).

use evdev::{Device, InputEventKind, Key};
use std::collections::HashSet;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::file::HotkeySettings;
use crate::error::{Result, StereoError};
use crate::pipeline::ControlCommand;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Modifier of a key chord; either side of the keyboard satisfies it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    /// Control key (`ctrl`, `control`)
    Ctrl,
    /// Alt key (`alt`)
    Alt,
    /// Shift key (`shift`)
    Shift,
    /// Logo key (`super`, `meta`, `win`)
    Super,
}

impl Modifier {
    fn keys(self) -> [Key; 2] {
        match self {
            Modifier::Ctrl => [Key::KEY_LEFTCTRL, Key::KEY_RIGHTCTRL],
            Modifier::Alt => [Key::KEY_LEFTALT, Key::KEY_RIGHTALT],
            Modifier::Shift => [Key::KEY_LEFTSHIFT, Key::KEY_RIGHTSHIFT],
            Modifier::Super => [Key::KEY_LEFTMETA, Key::KEY_RIGHTMETA],
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "alt" => Some(Modifier::Alt),
            "shift" => Some(Modifier::Shift),
            "super" | "meta" | "win" => Some(Modifier::Super),
            _ => None,
        }
    }

    fn is_held(self, pressed: &HashSet<Key>) -> bool {
        self.keys().iter().any(|k| pressed.contains(k))
    }
}

/// A key chord bound to a pipeline command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hotkey {
    /// Modifiers that must be held
    pub modifiers: Vec<Modifier>,
    /// Key whose press fires the binding
    pub key: Key,
    /// Command sent when fired
    pub command: ControlCommand,
}

impl Hotkey {
    /// Parse a chord like `ctrl+shift+m`
    pub fn parse(chord: &str, command: ControlCommand) -> Result<Self> {
        let mut modifiers = Vec::new();
        let mut key = None;

        for part in chord.split('+').map(|p| p.trim().to_lowercase()) {
            if part.is_empty() {
                return Err(StereoError::configuration(format!(
                    "Empty key in hotkey '{}'",
                    chord
                )));
            }
            if let Some(modifier) = Modifier::parse(&part) {
                if !modifiers.contains(&modifier) {
                    modifiers.push(modifier);
                }
            } else if key.replace(parse_key(&part)?).is_some() {
                return Err(StereoError::configuration(format!(
                    "Hotkey '{}' names more than one key",
                    chord
                )));
            }
        }

        let key = key.ok_or_else(|| {
            StereoError::configuration(format!("No key specified in hotkey '{}'", chord))
        })?;
        Ok(Self {
            modifiers,
            key,
            command,
        })
    }

    /// Whether this chord is complete in `pressed`
    pub fn matches(&self, pressed: &HashSet<Key>) -> bool {
        pressed.contains(&self.key) && self.modifiers.iter().all(|m| m.is_held(pressed))
    }
}

const NAMED_KEYS: &[(&str, Key)] = &[
    ("a", Key::KEY_A),
    ("b", Key::KEY_B),
    ("c", Key::KEY_C),
    ("d", Key::KEY_D),
    ("e", Key::KEY_E),
    ("f", Key::KEY_F),
    ("g", Key::KEY_G),
    ("h", Key::KEY_H),
    ("i", Key::KEY_I),
    ("j", Key::KEY_J),
    ("k", Key::KEY_K),
    ("l", Key::KEY_L),
    ("m", Key::KEY_M),
    ("n", Key::KEY_N),
    ("o", Key::KEY_O),
    ("p", Key::KEY_P),
    ("q", Key::KEY_Q),
    ("r", Key::KEY_R),
    ("s", Key::KEY_S),
    ("t", Key::KEY_T),
    ("u", Key::KEY_U),
    ("v", Key::KEY_V),
    ("w", Key::KEY_W),
    ("x", Key::KEY_X),
    ("y", Key::KEY_Y),
    ("z", Key::KEY_Z),
    ("0", Key::KEY_0),
    ("1", Key::KEY_1),
    ("2", Key::KEY_2),
    ("3", Key::KEY_3),
    ("4", Key::KEY_4),
    ("5", Key::KEY_5),
    ("6", Key::KEY_6),
    ("7", Key::KEY_7),
    ("8", Key::KEY_8),
    ("9", Key::KEY_9),
    ("f1", Key::KEY_F1),
    ("f2", Key::KEY_F2),
    ("f3", Key::KEY_F3),
    ("f4", Key::KEY_F4),
    ("f5", Key::KEY_F5),
    ("f6", Key::KEY_F6),
    ("f7", Key::KEY_F7),
    ("f8", Key::KEY_F8),
    ("f9", Key::KEY_F9),
    ("f10", Key::KEY_F10),
    ("f11", Key::KEY_F11),
    ("f12", Key::KEY_F12),
    ("space", Key::KEY_SPACE),
    ("enter", Key::KEY_ENTER),
    ("esc", Key::KEY_ESC),
    ("escape", Key::KEY_ESC),
    ("tab", Key::KEY_TAB),
    ("left", Key::KEY_LEFT),
    ("right", Key::KEY_RIGHT),
    ("up", Key::KEY_UP),
    ("down", Key::KEY_DOWN),
    ("pause", Key::KEY_PAUSE),
];

fn parse_key(name: &str) -> Result<Key> {
    NAMED_KEYS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, k)| *k)
        .ok_or_else(|| StereoError::configuration(format!("Unknown key: {}", name)))
}

/// Bindings described by the `[hotkeys]` config section
pub fn bindings_from_settings(settings: &HotkeySettings) -> Result<Vec<Hotkey>> {
    Ok(vec![
        Hotkey::parse(&settings.cycle_mode, ControlCommand::CycleMode)?,
        Hotkey::parse(&settings.quit, ControlCommand::Quit)?,
    ])
}

/// Background keyboard reader
pub struct HotkeyListener {
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl HotkeyListener {
    /// Start reading keyboards and forwarding fired bindings to `commands`
    pub fn spawn(bindings: Vec<Hotkey>, commands: mpsc::Sender<ControlCommand>) -> Result<Self> {
        let keyboards = open_keyboards();
        if keyboards.is_empty() {
            return Err(StereoError::resource(
                "No readable keyboard devices under /dev/input; add your user to the 'input' group",
            ));
        }
        info!("Watching {} keyboard(s) for hotkeys", keyboards.len());

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("stereoglyph-hotkeys".to_string())
            .spawn(move || listen(keyboards, bindings, commands, flag))
            .map_err(|e| StereoError::resource(format!("Failed to spawn hotkey thread: {}", e)))?;

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    /// Whether the reader thread is still active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the reader thread and wait for it
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Hotkey thread panicked");
            }
            debug!("Hotkey listener stopped");
        }
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_keyboards() -> Vec<Device> {
    let Ok(entries) = std::fs::read_dir("/dev/input") else {
        return Vec::new();
    };

    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("event"))
        })
        .filter_map(|path| match Device::open(&path) {
            Ok(device) => Some((path, device)),
            Err(e) => {
                trace!("Cannot open {:?}: {}", path, e);
                None
            }
        })
        .filter(|(_, device)| {
            device
                .supported_keys()
                .is_some_and(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_ENTER))
        })
        .map(|(path, device)| {
            set_nonblocking(&device);
            debug!("Keyboard {:?}: {}", path, device.name().unwrap_or("unknown"));
            device
        })
        .collect()
}

fn set_nonblocking(device: &Device) {
    let fd = device.as_raw_fd();
    // SAFETY: fd is a valid open descriptor owned by `device`
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags >= 0 {
            libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
    }
}

fn listen(
    mut keyboards: Vec<Device>,
    bindings: Vec<Hotkey>,
    commands: mpsc::Sender<ControlCommand>,
    running: Arc<AtomicBool>,
) {
    let mut pressed: HashSet<Key> = HashSet::new();

    while running.load(Ordering::SeqCst) {
        for keyboard in &mut keyboards {
            let Ok(events) = keyboard.fetch_events() else {
                continue;
            };
            for event in events {
                let InputEventKind::Key(key) = event.kind() else {
                    continue;
                };
                match event.value() {
                    // press; repeats (2) must not re-fire
                    1 => {
                        pressed.insert(key);
                        for binding in bindings.iter().filter(|b| b.key == key) {
                            if binding.matches(&pressed) {
                                debug!("Hotkey fired: {:?}", binding.command);
                                if commands.blocking_send(binding.command).is_err() {
                                    warn!("Pipeline gone, stopping hotkey listener");
                                    running.store(false, Ordering::SeqCst);
                                    return;
                                }
                            }
                        }
                    }
                    0 => {
                        pressed.remove(&key);
                    }
                    _ => {}
                }
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[Key]) -> HashSet<Key> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_parse_chord() {
        let hotkey = Hotkey::parse("Ctrl+Shift+M", ControlCommand::CycleMode).unwrap();
        assert_eq!(hotkey.key, Key::KEY_M);
        assert_eq!(hotkey.modifiers, vec![Modifier::Ctrl, Modifier::Shift]);
        assert_eq!(hotkey.command, ControlCommand::CycleMode);
    }

    #[test]
    fn test_parse_rejects_bad_chords() {
        assert!(Hotkey::parse("ctrl+shift", ControlCommand::Quit).is_err());
        assert!(Hotkey::parse("ctrl++q", ControlCommand::Quit).is_err());
        assert!(Hotkey::parse("a+b", ControlCommand::Quit).is_err());
        assert!(Hotkey::parse("ctrl+hyper", ControlCommand::Quit).is_err());
    }

    #[test]
    fn test_modifier_aliases() {
        for (name, modifier) in [
            ("control", Modifier::Ctrl),
            ("alt", Modifier::Alt),
            ("shift", Modifier::Shift),
            ("meta", Modifier::Super),
            ("win", Modifier::Super),
        ] {
            let hotkey = Hotkey::parse(&format!("{}+q", name), ControlCommand::Quit).unwrap();
            assert_eq!(hotkey.modifiers, vec![modifier]);
        }

        let hotkey = Hotkey::parse("Alt+Super+q", ControlCommand::Quit).unwrap();
        assert!(hotkey.matches(&keys(&[Key::KEY_RIGHTALT, Key::KEY_LEFTMETA, Key::KEY_Q])));
        assert!(!hotkey.matches(&keys(&[Key::KEY_RIGHTALT, Key::KEY_Q])));
    }

    #[test]
    fn test_matches_either_side_modifier() {
        let hotkey = Hotkey::parse("ctrl+q", ControlCommand::Quit).unwrap();
        assert!(!hotkey.matches(&keys(&[Key::KEY_Q])));
        assert!(hotkey.matches(&keys(&[Key::KEY_LEFTCTRL, Key::KEY_Q])));
        assert!(hotkey.matches(&keys(&[Key::KEY_RIGHTCTRL, Key::KEY_Q])));
    }

    #[test]
    fn test_default_bindings_parse() {
        let bindings = bindings_from_settings(&HotkeySettings::default()).unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[1].command, ControlCommand::Quit);
    }
}
