//! # Pixel Truth
//!
//! A visual-regression capture and diff engine. Drives a remote Chrome
//! instance over the DevTools protocol to capture pixel-stable full-page
//! screenshots of a configured set of scenes, stores them content-addressed
//! by SHA-256, and reports any pixel-level change against a prior run.
//!
//! ## How a capture works
//!
//! Each (scene, width) pair becomes one capture job. A job borrows a browser
//! session from a bounded pool, emulates the requested viewport, navigates,
//! waits for the page to settle, then scrolls the page in viewport-height
//! steps capturing one tile per position. The tiles are composited onto a
//! single canvas, configured page regions are masked out, and the result is
//! encoded as PNG and addressed by its digest. Identical pages on identical
//! runs produce identical digests, so an unchanged scene costs nothing to
//! store and nothing to review.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pixel_truth::{EngineConfig, FsBlobStore, RunConfiguration, RunOrchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let raw = tokio::fs::read_to_string("pixel-truth.config.json").await?;
//!     let configuration: RunConfiguration = serde_json::from_str(&raw)?;
//!
//!     let store = Arc::new(FsBlobStore::open("pixel-truth-store").await?);
//!     let orchestrator = RunOrchestrator::new(EngineConfig::default(), store);
//!
//!     let record = orchestrator.run(configuration).await?;
//!     for result in &record.results {
//!         println!("{} -> {}", result.title, result.image);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Capture every scene and compare against the last accepted run
//! pixel-truth run --config pixel-truth.config.json --truth accepted.results.json
//!
//! # Render the visual diff between two stored images
//! pixel-truth diff --new <digest> --old <digest> --output diff.png
//! ```

/// Engine settings, run configuration, and the capture data model
pub mod config;

/// Error types for the capture pipeline
pub mod error;

/// Bounded pool of remote-browser sessions with FIFO handoff
pub mod session_pool;

/// Scroll-and-stitch capture of a single scene
pub mod capture;

/// Tile compositing, masking, and cropping
pub mod compositor;

/// Content addressing and dedup-aware storage
pub mod digest;

/// Blob store backends
pub mod storage;

/// Pixel-exact diff rendering
pub mod diff;

/// Run expansion, concurrent execution, and progress tracking
pub mod orchestrator;

/// Command-line interface implementation
pub mod cli;

/// Capture-pipeline metrics handles
pub mod metrics;


pub use cli::*;
pub use compositor::Rect;
pub use config::*;
pub use digest::{digest as image_digest, store_if_new, IMAGE_CONTENT_TYPE};
pub use error::*;
pub use metrics::*;
pub use orchestrator::*;
pub use session_pool::*;
pub use storage::*;
