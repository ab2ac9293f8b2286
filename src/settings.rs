// ============================================================================
// SETTINGS - key=value configuration file
// ============================================================================

use std::path::{Path, PathBuf};

use crate::geometry::Rect;
use crate::masked::Sampling;
use crate::selection::DEFAULT_CLIP_RECT;

const SETTINGS_FILE: &str = "pixelsel_settings.cfg";

/// User-tunable settings shared by the CLI and library callers.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Size of the rayon pool; 0 = one thread per logical CPU.
    pub worker_threads: usize,
    pub default_sampling: Sampling,
    pub clip_width: i32,
    pub clip_height: i32,
    pub max_undo_steps: usize,
    /// Edge length of the tiles masked buffers are stored in.
    pub tile_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            default_sampling: Sampling::Bilinear,
            clip_width: DEFAULT_CLIP_RECT.width,
            clip_height: DEFAULT_CLIP_RECT.height,
            max_undo_steps: 50,
            tile_size: 64,
        }
    }
}

impl Settings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/pixelsel/pixelsel_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\pixelsel\pixelsel_settings.cfg
    /// On macOS:   ~/Library/Application Support/pixelsel/pixelsel_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("pixelsel").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("pixelsel")
                    .join(SETTINGS_FILE),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("pixelsel").join(SETTINGS_FILE))
        }
    }

    pub fn clip_rect(&self) -> Rect {
        Rect::new(0, 0, self.clip_width, self.clip_height)
    }

    /// Load from the default location (defaults if missing or unreadable).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else { return Self::default() };
        Self::parse(&content)
    }

    /// Parse `key=value` lines. Unknown keys and malformed values are
    /// skipped and leave the default in place.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "worker_threads" => {
                    if let Ok(v) = val.parse() {
                        s.worker_threads = v;
                    }
                }
                "default_sampling" => {
                    if let Some(v) = Sampling::from_name(val) {
                        s.default_sampling = v;
                    }
                }
                "clip_width" => {
                    if let Ok(v) = val.parse::<i32>()
                        && v > 0
                    {
                        s.clip_width = v;
                    }
                }
                "clip_height" => {
                    if let Ok(v) = val.parse::<i32>()
                        && v > 0
                    {
                        s.clip_height = v;
                    }
                }
                "max_undo_steps" => {
                    if let Ok(v) = val.parse() {
                        s.max_undo_steps = v;
                    }
                }
                "tile_size" => {
                    if let Ok(v) = val.parse::<u32>() {
                        s.tile_size = v.clamp(8, 4096);
                    }
                }
                _ => {}
            }
        }
        s
    }

    pub fn serialize(&self) -> String {
        format!(
            "worker_threads={}\n\
             default_sampling={}\n\
             clip_width={}\n\
             clip_height={}\n\
             max_undo_steps={}\n\
             tile_size={}\n",
            self.worker_threads,
            self.default_sampling.name(),
            self.clip_width,
            self.clip_height,
            self.max_undo_steps,
            self.tile_size,
        )
    }

    /// Save to the default location.
    pub fn save(&self) -> std::io::Result<()> {
        match Self::settings_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.serialize())
    }

    /// Size the global rayon pool. Only the first call in a process has any
    /// effect; later calls are logged and ignored.
    pub fn apply_thread_pool(&self) {
        if self.worker_threads == 0 {
            return;
        }
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_threads)
            .build_global()
        {
            crate::log_warn!("Could not size worker pool to {}: {}", self.worker_threads, e);
        }
    }
}
