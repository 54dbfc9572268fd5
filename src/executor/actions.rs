use serde::{Deserialize, Deserializer, Serialize};

/// Loosely-typed action as produced by the oracle: a tag plus a params map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub action: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Models write `"params": null` for parameterless actions.
fn null_as_empty<'de, D>(deserializer: D) -> Result<serde_json::Map<String, serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let params: Option<serde_json::Map<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(params.unwrap_or_default())
}

impl Step {
    pub fn new(action: impl Into<String>, params: serde_json::Value) -> Self {
        let params = match params {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            action: action.into(),
            params,
        }
    }

    pub fn is_click_element(&self) -> bool {
        self.action == CLICK_ELEMENT_TAG
    }

    /// Resolve the tag through the action table and type-check the params.
    pub fn to_action(&self) -> Result<Action, String> {
        let tagged = serde_json::json!({
            "action": self.action,
            "params": self.params,
        });
        serde_json::from_value(tagged)
            .map_err(|e| format!("invalid step `{}`: {e}", self.action))
    }
}

pub const CLICK_ELEMENT_TAG: &str = "click_element";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

fn default_scroll_amount() -> i32 {
    3
}

fn default_wait_seconds() -> f64 {
    1.0
}

/// Closed action vocabulary. The serde tag table maps oracle names
/// (and their aliases) to variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum Action {
    #[serde(alias = "open_app", alias = "launch_app")]
    ActivateApp {
        #[serde(alias = "name", alias = "app_name")]
        app: String,
    },
    #[serde(alias = "close_app")]
    QuitApp {
        #[serde(alias = "name", alias = "app_name")]
        app: String,
    },
    #[serde(alias = "navigate")]
    OpenUrl { url: String },
    Click { x: i32, y: i32 },
    DoubleClick { x: i32, y: i32 },
    RightClick { x: i32, y: i32 },
    #[serde(alias = "move")]
    MoveTo { x: i32, y: i32 },
    Scroll {
        direction: ScrollDirection,
        #[serde(default = "default_scroll_amount")]
        amount: i32,
    },
    #[serde(alias = "type")]
    TypeText { text: String },
    #[serde(alias = "key", alias = "hotkey")]
    PressKey {
        #[serde(alias = "keys")]
        key: String,
    },
    Wait {
        #[serde(default = "default_wait_seconds")]
        seconds: f64,
    },
    /// Grounding lookup by description, then a click at the resolved point.
    ClickElement {
        #[serde(alias = "element", alias = "target")]
        description: String,
    },
    /// No-op the engine substitutes for an unusable plan.
    Idle {},
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::ActivateApp { .. } => "activate_app",
            Action::QuitApp { .. } => "quit_app",
            Action::OpenUrl { .. } => "open_url",
            Action::Click { .. } => "click",
            Action::DoubleClick { .. } => "double_click",
            Action::RightClick { .. } => "right_click",
            Action::MoveTo { .. } => "move_to",
            Action::Scroll { .. } => "scroll",
            Action::TypeText { .. } => "type_text",
            Action::PressKey { .. } => "press_key",
            Action::Wait { .. } => "wait",
            Action::ClickElement { .. } => CLICK_ELEMENT_TAG,
            Action::Idle {} => "idle",
        }
    }

    /// Params as a JSON object, for logs and result records.
    pub fn params(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("params").map(serde_json::Value::take))
            .unwrap_or_else(|| serde_json::json!({}))
    }
}
