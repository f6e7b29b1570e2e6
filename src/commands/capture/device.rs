use anyhow::Result;
use async_trait::async_trait;

/// Physical screen size in device points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelPoint {
    pub x: i64,
    pub y: i64,
}

/// The UI-automation surface the capture walk drives.
///
/// The app renders without an accessibility tree, so everything is done with coordinate
/// gestures and full-screen PNG screenshots.
#[async_trait]
pub trait Device: Send + Sync {
    async fn window_size(&self) -> Result<WindowSize>;

    async fn tap(&self, at: PixelPoint) -> Result<()>;

    async fn swipe(&self, from: PixelPoint, to: PixelPoint) -> Result<()>;

    /// PNG bytes of the current screen.
    async fn screenshot(&self) -> Result<Vec<u8>>;
}
