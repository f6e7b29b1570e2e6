use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info, warn};

use super::device::{Device, PixelPoint, WindowSize};

/// Pause between pointer down and up for a tap.
const TAP_HOLD_MS: u64 = 50;
const SWIPE_MOVE_MS: u64 = 300;

/// Capabilities used when no capabilities file is given: the HOME app on an iOS device,
/// left in its current state.
pub fn default_capabilities() -> JsonValue {
    json!({
        "platformName": "iOS",
        "appium:automationName": "XCUITest",
        "appium:bundleId": "jp.pokemon.pokemonhome",
        "appium:noReset": true,
        "appium:newCommandTimeout": 120
    })
}

/// A device driven through a W3C WebDriver server (such as Appium).
pub struct WebDriverDevice {
    http: reqwest::Client,
    session_url: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    value: T,
}

#[derive(Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Deserialize)]
struct WindowRect {
    width: f64,
    height: f64,
}

#[derive(Deserialize)]
struct WebDriverError {
    error: String,
    #[serde(default)]
    message: String,
}

impl WebDriverDevice {
    pub async fn connect(server_url: &str, capabilities: JsonValue) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build HTTP client")?;
        let server_url = server_url.trim_end_matches('/');

        let response = http
            .post(format!("{server_url}/session"))
            .json(&json!({ "capabilities": { "alwaysMatch": capabilities } }))
            .send()
            .await
            .with_context(|| format!("failed to reach WebDriver server at {server_url}"))?;
        let session: NewSession = decode(response, "new session").await?;

        info!(session = %session.session_id, "webdriver session started");
        Ok(Self {
            http,
            session_url: format!("{server_url}/session/{}", session.session_id),
        })
    }

    /// Ends the session. Failures are logged; the walk's own result matters more.
    pub async fn close(&self) {
        match self.http.delete(&self.session_url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("webdriver session closed");
            }
            Ok(response) => warn!(status = %response.status(), "webdriver session close failed"),
            Err(err) => warn!(error = %err, "webdriver session close failed"),
        }
    }

    async fn perform(&self, actions: JsonValue) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/actions", self.session_url))
            .json(&json!({ "actions": [actions] }))
            .send()
            .await
            .context("failed to send pointer actions")?;
        let _: JsonValue = decode(response, "perform actions").await?;
        Ok(())
    }
}

fn touch_actions(steps: Vec<JsonValue>) -> JsonValue {
    json!({
        "type": "pointer",
        "id": "finger1",
        "parameters": { "pointerType": "touch" },
        "actions": steps
    })
}

fn move_to(at: PixelPoint, duration_ms: u64) -> JsonValue {
    json!({ "type": "pointerMove", "duration": duration_ms, "x": at.x, "y": at.y })
}

pub(super) fn tap_actions(at: PixelPoint) -> JsonValue {
    touch_actions(vec![
        move_to(at, 0),
        json!({ "type": "pointerDown", "button": 0 }),
        json!({ "type": "pause", "duration": TAP_HOLD_MS }),
        json!({ "type": "pointerUp", "button": 0 }),
    ])
}

pub(super) fn swipe_actions(from: PixelPoint, to: PixelPoint) -> JsonValue {
    touch_actions(vec![
        move_to(from, 0),
        json!({ "type": "pointerDown", "button": 0 }),
        json!({ "type": "pause", "duration": TAP_HOLD_MS }),
        move_to(to, SWIPE_MOVE_MS),
        json!({ "type": "pause", "duration": 100 }),
        json!({ "type": "pointerUp", "button": 0 }),
    ])
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response, command: &str) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("failed to read {command} response"))?;

    if !status.is_success() {
        let detail = serde_json::from_str::<Envelope<WebDriverError>>(&body)
            .map(|envelope| format!("{}: {}", envelope.value.error, envelope.value.message))
            .unwrap_or(body);
        bail!("webdriver {command} failed with {status}: {detail}");
    }

    let envelope: Envelope<T> = serde_json::from_str(&body)
        .with_context(|| format!("unexpected {command} response: {body}"))?;
    Ok(envelope.value)
}

#[async_trait]
impl Device for WebDriverDevice {
    async fn window_size(&self) -> Result<WindowSize> {
        let response = self
            .http
            .get(format!("{}/window/rect", self.session_url))
            .send()
            .await
            .context("failed to request window rect")?;
        let rect: WindowRect = decode(response, "window rect").await?;
        Ok(WindowSize {
            width: rect.width as u32,
            height: rect.height as u32,
        })
    }

    async fn tap(&self, at: PixelPoint) -> Result<()> {
        self.perform(tap_actions(at)).await
    }

    async fn swipe(&self, from: PixelPoint, to: PixelPoint) -> Result<()> {
        self.perform(swipe_actions(from, to)).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(format!("{}/screenshot", self.session_url))
            .send()
            .await
            .context("failed to request screenshot")?;
        let encoded: String = decode(response, "screenshot").await?;
        BASE64
            .decode(encoded.trim())
            .context("screenshot was not valid base64")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_is_a_single_touch_press_and_release() {
        let actions = tap_actions(PixelPoint { x: 195, y: 764 });
        assert_eq!(actions["parameters"]["pointerType"], "touch");

        let steps = actions["actions"].as_array().expect("steps");
        let kinds: Vec<&str> = steps
            .iter()
            .filter_map(|step| step["type"].as_str())
            .collect();
        assert_eq!(kinds, ["pointerMove", "pointerDown", "pause", "pointerUp"]);
        assert_eq!(steps[0]["x"], 195);
        assert_eq!(steps[0]["y"], 764);
    }

    #[test]
    fn swipe_moves_between_points_while_pressed() {
        let actions = swipe_actions(PixelPoint { x: 10, y: 600 }, PixelPoint { x: 10, y: 200 });
        let steps = actions["actions"].as_array().expect("steps");
        assert_eq!(steps[3]["type"], "pointerMove");
        assert_eq!(steps[3]["y"], 200);
        assert_eq!(steps[3]["duration"], SWIPE_MOVE_MS);
    }
}
