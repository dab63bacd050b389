//! Drives one remote-browser session through a single scene
//!
//! Emulates the requested viewport, navigates, suppresses the browser's
//! own scrollbar, resolves mask/crop rectangles, then walks the page in
//! viewport-height steps capturing one tile per scroll position. The
//! browser clamping a scroll request is the bottom-of-page signal: the
//! final tile overlaps its predecessor rather than under-covering the
//! page.

use crate::{
    compositor::{self, Rect},
    digest, CaptureError, CaptureRequest, CapturedImage, CdpSession, EngineConfig, Tile,
};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use tokio::time::sleep;
use tracing::debug;

/// Capture one scene at one width on an exclusively-owned session.
pub async fn capture_scene(
    session: &CdpSession,
    request: &CaptureRequest,
    engine: &EngineConfig,
) -> Result<CapturedImage, CaptureError> {
    let page = session
        .browser
        .new_page("about:blank")
        .await
        .map_err(|e| CaptureError::Navigation(e.to_string()))?;

    let result = capture_page(&page, request, engine).await;
    let _ = page.close().await;
    result
}

async fn capture_page(
    page: &Page,
    request: &CaptureRequest,
    engine: &EngineConfig,
) -> Result<CapturedImage, CaptureError> {
    // Non-headless windows lose a few pixels of width to OS chrome.
    let frame_width = if request.headless {
        0
    } else {
        engine.window_frame_width
    };

    let metrics = SetDeviceMetricsOverrideParams::builder()
        .width(request.width + frame_width)
        .height(engine.browser_height)
        .device_scale_factor(1.0)
        .mobile(false)
        .build()
        .map_err(CaptureError::Script)?;
    page.execute(metrics)
        .await
        .map_err(|e| CaptureError::Script(e.to_string()))?;

    page.goto(request.url.as_str())
        .await
        .map_err(|e| CaptureError::Navigation(e.to_string()))?;
    page.wait_for_navigation()
        .await
        .map_err(|e| CaptureError::Navigation(e.to_string()))?;

    // The page scrolls under script control; the browser's own scrollbar
    // must not appear in captures.
    exec(page, "document.body.style.overflowY = 'hidden'").await?;
    exec(page, "window.scrollTo(0, 0)").await?;

    // Fixed settle point for async layout and rendering.
    sleep(engine.settle_delay).await;

    let inner_height = eval_f64(page, "window.innerHeight").await?.round() as u32;
    if request.header_height >= inner_height {
        return Err(CaptureError::Configuration(format!(
            "header height {} leaves no capturable viewport (inner height {})",
            request.header_height, inner_height
        )));
    }
    let tile_height = inner_height - request.header_height;

    let only = match &request.scene.only {
        Some(selector) => resolve_rect(page, selector).await?,
        None => None,
    };

    let mut masks = Vec::new();
    for selector in &request.mask {
        if let Some(rect) = resolve_rect(page, selector).await? {
            masks.push(rect);
        }
    }

    let tiles = capture_tiles(page, tile_height).await?;
    let last_offset = tiles.last().map(|t| t.offset).unwrap_or(0);
    let total_height = last_offset + tile_height + request.header_height;

    debug!(
        "Captured {} tile(s) for \"{}\", page height {}",
        tiles.len(),
        request.result_title(),
        total_height
    );

    let (bytes, width, height) =
        compositor::compose(request.width, total_height, &tiles, &masks, only)?;

    Ok(CapturedImage {
        digest: digest::digest(&bytes),
        width,
        height,
        bytes,
    })
}

/// What the scroll loop does with one achieved scroll position
#[derive(Debug, PartialEq, Eq)]
enum TileAction {
    /// The browser clamped onto the previous tile's offset; the bottom is
    /// already covered and no new tile is needed.
    Stop,
    /// The browser clamped short of the target: capture the final,
    /// overlapping tile, then stop.
    CaptureAndStop,
    /// Full scroll step achieved: capture and advance.
    CaptureAndContinue,
}

fn plan_tile(previous_offset: Option<u32>, achieved: u32, target: u32) -> TileAction {
    if previous_offset == Some(achieved) {
        TileAction::Stop
    } else if achieved < target {
        TileAction::CaptureAndStop
    } else {
        TileAction::CaptureAndContinue
    }
}

async fn capture_tiles(page: &Page, tile_height: u32) -> Result<Vec<Tile>, CaptureError> {
    let mut tiles: Vec<Tile> = Vec::new();
    let mut target = 0u32;

    loop {
        exec(page, &format!("window.scrollTo(0, {target})")).await?;
        let achieved = eval_f64(page, "window.scrollY").await?.round() as u32;

        match plan_tile(tiles.last().map(|t| t.offset), achieved, target) {
            TileAction::Stop => break,
            action => {
                let data = screenshot(page).await?;
                tiles.push(Tile {
                    offset: achieved,
                    data,
                });
                if action == TileAction::CaptureAndStop {
                    break;
                }
                target += tile_height;
            }
        }
    }

    Ok(tiles)
}

async fn screenshot(page: &Page) -> Result<Vec<u8>, CaptureError> {
    let params = ScreenshotParams::builder()
        .format(CaptureScreenshotFormat::Png)
        .build();
    page.screenshot(params)
        .await
        .map_err(|e| CaptureError::Screenshot(e.to_string()))
}

/// Bounding box of the first element matching `selector`, in page
/// coordinates. A selector matching nothing yields `None`, never an error.
async fn resolve_rect(page: &Page, selector: &str) -> Result<Option<Rect>, CaptureError> {
    let selector_literal = serde_json::to_string(selector)?;
    let script = format!(
        "(() => {{
            const el = document.querySelector({selector_literal});
            if (!el) {{ return null; }}
            const r = el.getBoundingClientRect();
            return {{
                left: r.left + window.scrollX,
                top: r.top + window.scrollY,
                width: r.width,
                height: r.height,
            }};
        }})()"
    );

    page.evaluate(script)
        .await
        .map_err(|e| CaptureError::Script(e.to_string()))?
        .into_value::<Option<Rect>>()
        .map_err(|e| CaptureError::Script(e.to_string()))
}

async fn exec(page: &Page, script: &str) -> Result<(), CaptureError> {
    page.evaluate(script)
        .await
        .map_err(|e| CaptureError::Script(e.to_string()))?;
    Ok(())
}

async fn eval_f64(page: &Page, expression: &str) -> Result<f64, CaptureError> {
    page.evaluate(expression)
        .await
        .map_err(|e| CaptureError::Script(e.to_string()))?
        .into_value::<f64>()
        .map_err(|e| CaptureError::Script(e.to_string()))
}
