//! Configuration management with serde serialization/deserialization
//!
//! Two layers of configuration exist: `EngineConfig` controls how the
//! capture engine talks to the remote browser (endpoint, pool size,
//! emulated window geometry), while `RunConfiguration` describes one
//! visual-regression run (origin, widths, scenes) and is immutable once
//! the run starts.

use crate::CaptureError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine-level settings for the capture pipeline
///
/// # Examples
///
/// ```rust
/// use pixel_truth::EngineConfig;
///
/// let engine = EngineConfig {
///     max_sessions: 2,
///     ..Default::default()
/// };
/// assert_eq!(engine.browser_height, 1249);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// DevTools endpoint of the remote browser the session pool connects to
    pub automation_endpoint: String,

    /// Maximum number of live remote-browser sessions (default: 4)
    ///
    /// Acquirers beyond this bound queue FIFO until a session is released.
    pub max_sessions: usize,

    /// Emulated browser window height in pixels (default: 1249)
    ///
    /// Pages taller than this are captured tile by tile and stitched.
    pub browser_height: u32,

    /// Extra window width consumed by OS-drawn chrome when running
    /// non-headless (default: 8). Zero in headless mode.
    pub window_frame_width: u32,

    /// Whether sessions run headless (default: true)
    pub headless: bool,

    /// Fixed delay after navigation before the first capture (default: 500ms)
    ///
    /// A pragmatic synchronization point for async layout and rendering,
    /// not a guarantee of stability.
    pub settle_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            automation_endpoint: "ws://localhost:9222".to_string(),
            max_sessions: 4,
            browser_height: 1249,
            window_frame_width: 8,
            headless: true,
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// One named page to capture, at every configured width
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Scene {
    /// Unique title within a run; results are keyed by `"{title} w{width}"`
    pub title: String,

    /// Path appended to the run's origin to form the scene URL
    pub path: String,

    /// Selector whose bounding box the final image is cropped to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<String>,

    /// Mask selectors for this scene; falls back to the run-level mask
    /// list when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Vec<String>>,
}

/// A submitted run configuration: the cross product of scenes and widths
/// defines the run's job count
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfiguration {
    /// Base URL all scene paths are resolved against
    pub origin: String,

    /// Viewport widths each scene is captured at
    pub widths: Vec<u32>,

    /// Sticky header height in pixels, excluded from per-tile scroll
    /// advancement so it does not duplicate across tiles (default: 0)
    #[serde(default)]
    pub header: u32,

    /// Run-level mask selectors applied to scenes without their own list
    #[serde(default)]
    pub mask: Vec<String>,

    pub scenes: Vec<Scene>,
}

impl RunConfiguration {
    /// Validate a configuration before a run starts.
    ///
    /// Scene titles must be unique, the origin must be an http(s) URL and
    /// both widths and scenes must be non-empty.
    pub fn validate(&self) -> Result<(), CaptureError> {
        let parsed = url::Url::parse(&self.origin)
            .map_err(|e| CaptureError::Configuration(format!("invalid origin: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CaptureError::Configuration(format!(
                "origin must be http or https, got {}",
                parsed.scheme()
            )));
        }

        if self.widths.is_empty() {
            return Err(CaptureError::Configuration(
                "at least one width is required".to_string(),
            ));
        }

        if self.scenes.is_empty() {
            return Err(CaptureError::Configuration(
                "at least one scene is required".to_string(),
            ));
        }

        for scene in &self.scenes {
            let uses = self
                .scenes
                .iter()
                .filter(|s| s.title == scene.title)
                .count();
            if uses > 1 {
                return Err(CaptureError::Configuration(format!(
                    "scene title \"{}\" is used more than once",
                    scene.title
                )));
            }
        }

        Ok(())
    }

    /// Mask selectors effective for a scene: the scene's own list when
    /// present, else the run-level list.
    pub fn effective_mask(&self, scene: &Scene) -> Vec<String> {
        scene.mask.clone().unwrap_or_else(|| self.mask.clone())
    }
}

/// One capture job: a scene at one viewport width
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub scene: Scene,
    pub url: String,
    pub width: u32,
    pub header_height: u32,
    pub mask: Vec<String>,
    pub headless: bool,
}

impl CaptureRequest {
    /// Title the result record is keyed by, e.g. `"Home w320"`.
    pub fn result_title(&self) -> String {
        format!("{} w{}", self.scene.title, self.width)
    }
}

/// One viewport-height screenshot captured at a scroll offset
#[derive(Debug, Clone)]
pub struct Tile {
    /// Achieved vertical scroll position this tile was captured at
    pub offset: u32,
    /// PNG bytes as returned by the remote browser
    pub data: Vec<u8>,
}

/// A finished, content-addressed full-page image
#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// SHA-256 of `bytes`, lowercase hex; the image's sole identity
    pub digest: String,
    pub width: u32,
    pub height: u32,
    /// Losslessly encoded PNG
    pub bytes: Vec<u8>,
}

/// Result record emitted per capture request, in submission order
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SceneResult {
    pub title: String,
    /// Digest of the stored image
    pub image: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Done,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunProgress {
    pub state: RunState,
    pub completed: usize,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The full output of one run: results plus terminal progress
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub results: Vec<SceneResult>,
    pub progress: RunProgress,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(title: &str) -> Scene {
        Scene {
            title: title.to_string(),
            path: "/".to_string(),
            only: None,
            mask: None,
        }
    }

    fn base_configuration() -> RunConfiguration {
        RunConfiguration {
            origin: "http://localhost:3000".to_string(),
            widths: vec![320, 1280],
            header: 0,
            mask: vec![],
            scenes: vec![scene("Home")],
        }
    }

    #[test]
    fn test_engine_defaults() {
        let engine = EngineConfig::default();
        assert_eq!(engine.max_sessions, 4);
        assert_eq!(engine.browser_height, 1249);
        assert_eq!(engine.window_frame_width, 8);
        assert!(engine.headless);
        assert_eq!(engine.settle_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_validate_accepts_well_formed_configuration() {
        assert!(base_configuration().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_titles() {
        let mut configuration = base_configuration();
        configuration.scenes = vec![scene("Home"), scene("Home")];
        let err = configuration.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_validate_rejects_non_http_origin() {
        let mut configuration = base_configuration();
        configuration.origin = "ftp://files.example.com".to_string();
        assert!(configuration.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_widths_and_scenes() {
        let mut configuration = base_configuration();
        configuration.widths = vec![];
        assert!(configuration.validate().is_err());

        let mut configuration = base_configuration();
        configuration.scenes = vec![];
        assert!(configuration.validate().is_err());
    }

    #[test]
    fn test_scene_mask_falls_back_to_run_mask() {
        let mut configuration = base_configuration();
        configuration.mask = vec![".ad-banner".to_string()];

        let plain = scene("Plain");
        assert_eq!(
            configuration.effective_mask(&plain),
            vec![".ad-banner".to_string()]
        );

        let mut own = scene("Own");
        own.mask = Some(vec![".timestamp".to_string()]);
        assert_eq!(
            configuration.effective_mask(&own),
            vec![".timestamp".to_string()]
        );
    }

    #[test]
    fn test_configuration_parses_original_shape() {
        let raw = r#"{
            "origin": "http://localhost:3000",
            "widths": [320, 1280],
            "header": 64,
            "mask": [".clock"],
            "scenes": [
                { "title": "Home", "path": "/" },
                { "title": "About", "path": "/about", "only": "main", "mask": [] }
            ]
        }"#;

        let configuration: RunConfiguration = serde_json::from_str(raw).unwrap();
        assert_eq!(configuration.header, 64);
        assert_eq!(configuration.scenes.len(), 2);
        assert_eq!(configuration.scenes[1].only.as_deref(), Some("main"));
        assert_eq!(configuration.scenes[1].mask.as_deref(), Some(&[][..]));
    }
}
