// SPDX-License-Identifier: MIT

//! Direct-message outreach
//!
//! Walks a list of Instagram profiles and asks the operator to confirm,
//! edit or skip every message before it goes out. Input looks like
//! `profiles: a, b; message: Hi {handle}; max_profiles: 5; delay: 2`.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::interrupt::{apply_values, InteractionHooks, InterruptConfig, Validation};
use crate::engine::{
    step_fn, GraphError, Graph, StepContext, StepError, WorkflowState, WorkflowStatus, END,
};
use crate::waypoint::config::OutreachSettings;

pub const NAME: &str = "outreach";

pub const DEFAULT_TEMPLATE: &str = "Hi {handle}! Love your content, would you be open to a collaboration?";

const LOGIN_INTERRUPT: &str = "login_confirmation";
const MESSAGE_INTERRUPT: &str = "message_confirmation";

/// Delivers a confirmed message
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, handle: &str, profile_url: &str, text: &str) -> Result<(), StepError>;
}

/// Sender that only logs; used when no browser session is attached
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send(&self, handle: &str, profile_url: &str, text: &str) -> Result<(), StepError> {
        log::info!("Would message @{} ({}): {}", handle, profile_url, text);
        Ok(())
    }
}

/// Parameters parsed from the run input
#[derive(Debug, Clone, PartialEq)]
pub struct OutreachParams {
    pub profiles: Vec<String>,
    pub template: String,
    pub max_profiles: usize,
    pub delay_secs: u64,
}

impl OutreachParams {
    pub fn parse(input: &str, settings: &OutreachSettings) -> Self {
        let mut params = Self {
            profiles: Vec::new(),
            template: DEFAULT_TEMPLATE.to_string(),
            max_profiles: settings.default_max_profiles,
            delay_secs: settings.default_delay_secs,
        };

        for part in input.split([';', '\n']) {
            let Some((key, value)) = part.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_lowercase().as_str() {
                "profiles" => params.profiles.extend(
                    value
                        .split([',', ' '])
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string),
                ),
                "message" if !value.is_empty() => params.template = value.to_string(),
                "max_profiles" => match value.parse() {
                    Ok(max) => params.max_profiles = max,
                    Err(_) => log::warn!("Ignoring invalid max_profiles '{}'", value),
                },
                "delay" => match value.parse() {
                    Ok(delay) => params.delay_secs = delay,
                    Err(_) => log::warn!("Ignoring invalid delay '{}'", value),
                },
                other => log::debug!("Ignoring unknown parameter '{}'", other),
            }
        }
        params
    }
}

/// Reduce `@name`, `name` or a profile URL to the bare handle
pub fn normalize_handle(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let handle = match raw.find("instagram.com/") {
        Some(idx) => &raw[idx + "instagram.com/".len()..],
        None => raw,
    };
    let handle = handle
        .trim_start_matches('@')
        .split(['/', '?'])
        .next()
        .unwrap_or_default();

    let valid = !handle.is_empty()
        && handle.len() <= 30
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
    valid.then(|| handle.to_lowercase())
}

pub fn profile_url(handle: &str) -> String {
    format!("https://instagram.com/{}", handle)
}

fn render(template: &str, handle: &str) -> String {
    template
        .replace("{handle}", handle)
        .replace("{profile_url}", &profile_url(handle))
}

fn count(state: &WorkflowState, key: &str) -> i64 {
    state.get_i64(key).unwrap_or(0)
}

fn summary(state: &WorkflowState, success: bool, message: String) -> Value {
    json!({
        "success": success,
        "processed": count(state, "processed"),
        "successful": count(state, "successful"),
        "message": message,
    })
}

fn current_profile(state: &WorkflowState) -> Option<(String, String)> {
    let profile = state.get("current_profile")?;
    let handle = profile.get("handle")?.as_str()?.to_string();
    let url = profile.get("profile_url")?.as_str()?.to_string();
    Some((handle, url))
}

fn validate_login(raw: &str, _context: &Map<String, Value>) -> Validation {
    match raw.trim().to_lowercase().as_str() {
        "yes" | "y" | "yes, i've logged in" => Validation::accept_with("login_confirmed", true),
        "no" | "n" | "cancel" => Validation::accept_with("login_confirmed", false),
        _ => Validation::reject("Please confirm with 'Yes' or cancel with 'No'"),
    }
}

fn merge_login(state: WorkflowState, validation: &Validation) -> Result<WorkflowState, StepError> {
    let mut state = apply_values(state, validation)?;
    if validation.get_bool("login_confirmed") != Some(true) {
        state.error = Some("Login cancelled by user".to_string());
        state.status = WorkflowStatus::Cancelled;
    }
    Ok(state)
}

fn validate_message(raw: &str, _context: &Map<String, Value>) -> Validation {
    match raw.trim().to_lowercase().as_str() {
        "" | "edit" => Validation::reject("Type the new message to replace the current one"),
        "yes" | "y" | "send" | "send message" => Validation::accept_with("action", "send"),
        "no" | "n" | "skip" | "skip this profile" => Validation::accept_with("action", "skip"),
        "cancel" | "end" | "quit" | "exit" => Validation::accept_with("action", "cancel"),
        _ => Validation::accept_with("action", "edit").with("edited_message", raw.trim()),
    }
}

fn merge_message(mut state: WorkflowState, validation: &Validation) -> Result<WorkflowState, StepError> {
    let action = validation.get_str("action").unwrap_or("skip");
    state.update("message_confirmed", json!(action))?;
    if let Some(edited) = validation.get_str("edited_message") {
        state.update("message_text", json!(edited))?;
    }
    Ok(state)
}

/// Shows the operator which profile and text they are confirming
struct MessageHooks;

impl InteractionHooks for MessageHooks {
    fn validate_preconditions(
        &self,
        state: &WorkflowState,
        _config: &InterruptConfig,
    ) -> Option<WorkflowState> {
        if current_profile(state).is_some() {
            return None;
        }
        let mut ended = state.clone();
        ended.fail("No profile selected for message confirmation");
        Some(ended)
    }

    fn custom_data(&self, state: &WorkflowState, _config: &InterruptConfig) -> Map<String, Value> {
        let mut data = Map::new();
        if let Some((handle, url)) = current_profile(state) {
            data.insert("handle".to_string(), json!(handle));
            data.insert("profile_url".to_string(), json!(url));
        }
        if let Some(text) = state.get("message_text") {
            data.insert("message_text".to_string(), text.clone());
        }
        data
    }
}

fn interrupts() -> [InterruptConfig; 2] {
    [
        InterruptConfig::new(LOGIN_INTERRUPT, "login_confirmation")
            .message("Please confirm Instagram login")
            .instructions("Please log in to Instagram in the browser window, then confirm when ready")
            .options(["Yes, I've logged in", "Cancel"])
            .validator(validate_login)
            .merge(merge_login),
        InterruptConfig::new(MESSAGE_INTERRUPT, "message_confirmation")
            .message("Confirm or edit message")
            .instructions("Review the message and confirm when ready to send, or edit it")
            .options(["Send message", "Skip this profile", "Edit", "Cancel"])
            .validator(validate_message)
            .merge(merge_message),
    ]
}

/// Build the outreach graph
pub fn build(settings: &OutreachSettings, sender: Arc<dyn MessageSender>) -> Result<Graph, GraphError> {
    let settings = settings.clone();
    let [login, message] = interrupts();

    Graph::builder()
        .interrupt(login)
        .interrupt(message)
        .step(
            "extract_parameters",
            step_fn(move |mut state: WorkflowState, _ctx: StepContext| {
                let params = OutreachParams::parse(&state.input, &settings);
                async move {
                    state.update("requested_profiles", json!(params.profiles))?;
                    state.update("message_template", json!(params.template))?;
                    state.update("max_profiles", json!(params.max_profiles))?;
                    state.update("delay_secs", json!(params.delay_secs))?;
                    Ok(state)
                }
            }),
        )
        .step("validate_profiles", step_fn(validate_profiles))
        .step("initialize_automation", step_fn(initialize_automation))
        .human_interaction_step(LOGIN_INTERRUPT)
        .step("process_profiles", step_fn(process_profiles))
        .human_interaction_step_with_hooks(MESSAGE_INTERRUPT, Arc::new(MessageHooks))
        .step("prepare_message", step_fn(prepare_message))
        .step(
            "send_message",
            step_fn(move |state: WorkflowState, ctx: StepContext| {
                let sender = sender.clone();
                async move { send_message(state, ctx, sender.as_ref()).await }
            }),
        )
        .step("skip_profile", step_fn(skip_profile))
        .step("cancel_workflow", step_fn(cancel_workflow))
        .step("finalize_automation", step_fn(finalize_automation))
        .entry("extract_parameters")
        .edge("extract_parameters", "validate_profiles")
        .edge("validate_profiles", "initialize_automation")
        .edge("initialize_automation", "login_confirmation")
        .route_with_map(
            "login_confirmation",
            |state: &WorkflowState| {
                if state.get_bool("login_confirmed") == Some(true) {
                    "process_profiles".to_string()
                } else {
                    "END".to_string()
                }
            },
            [("process_profiles", "process_profiles"), ("END", END)],
        )
        .route_with_map(
            "process_profiles",
            |state: &WorkflowState| {
                if current_profile(state).is_some() {
                    "message_confirmation".to_string()
                } else {
                    "finalize_automation".to_string()
                }
            },
            [
                ("message_confirmation", "message_confirmation"),
                ("finalize_automation", "finalize_automation"),
            ],
        )
        .route_with_map(
            "message_confirmation",
            |state: &WorkflowState| {
                match state.get_str("message_confirmed") {
                    Some("cancel") => "cancel_workflow",
                    Some("send") => "prepare_message",
                    Some("edit") => "message_confirmation",
                    _ => "skip_profile",
                }
                .to_string()
            },
            [
                ("cancel_workflow", "cancel_workflow"),
                ("prepare_message", "prepare_message"),
                ("message_confirmation", "message_confirmation"),
                ("skip_profile", "skip_profile"),
            ],
        )
        .edge("prepare_message", "send_message")
        .edge("send_message", "process_profiles")
        .edge("skip_profile", "process_profiles")
        .edge("cancel_workflow", "finalize_automation")
        .edge("finalize_automation", END)
        .build()
}

async fn validate_profiles(mut state: WorkflowState, _ctx: StepContext) -> Result<WorkflowState, StepError> {
    let requested: Vec<String> = state
        .get("requested_profiles")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut profiles: Vec<Value> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for raw in &requested {
        match normalize_handle(raw) {
            Some(handle) if seen.insert(handle.clone()) => {
                profiles.push(json!({ "handle": handle, "profile_url": profile_url(&handle) }));
            }
            Some(_) => {}
            None => log::warn!("Skipping invalid profile '{}'", raw),
        }
    }

    if profiles.is_empty() {
        return Err(StepError::failed(
            "No valid Instagram profiles provided. Use 'profiles: handle1, handle2'",
        ));
    }
    log::info!("Validated {} profiles", profiles.len());
    state.update("profiles", Value::Array(profiles))?;
    Ok(state)
}

async fn initialize_automation(mut state: WorkflowState, ctx: StepContext) -> Result<WorkflowState, StepError> {
    ctx.check_cancelled()?;
    state.update("processed", json!(0))?;
    state.update("successful", json!(0))?;
    state.update("sent", json!([]))?;
    state.update("current_profile", Value::Null)?;
    state.update("message_text", Value::Null)?;
    Ok(state)
}

async fn process_profiles(mut state: WorkflowState, ctx: StepContext) -> Result<WorkflowState, StepError> {
    ctx.check_cancelled()?;

    let processed = count(&state, "processed");
    let max = count(&state, "max_profiles");
    let profiles = state
        .get("profiles")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let next = usize::try_from(processed)
        .ok()
        .filter(|idx| processed < max && *idx < profiles.len())
        .and_then(|idx| profiles.get(idx).cloned());

    match next {
        Some(profile) => {
            let handle = profile
                .get("handle")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let template = state
                .get_str("message_template")
                .unwrap_or(DEFAULT_TEMPLATE)
                .to_string();
            log::info!("[{}] preparing message for @{}", ctx.thread_id(), handle);
            state.update("message_text", json!(render(&template, &handle)))?;
            state.update("message_confirmed", Value::Null)?;
            state.update("current_profile", profile)?;
        }
        None => {
            state.update("current_profile", Value::Null)?;
            state.update("message_text", Value::Null)?;
            let message = format!(
                "Successfully processed {} profiles. Successfully messaged: {}",
                processed,
                count(&state, "successful")
            );
            let result = summary(&state, true, message);
            state.update("automation_result", result)?;
        }
    }
    Ok(state)
}

async fn prepare_message(state: WorkflowState, ctx: StepContext) -> Result<WorkflowState, StepError> {
    ctx.check_cancelled()?;
    let text = state.get_str("message_text").unwrap_or_default().trim();
    if text.is_empty() {
        return Err(StepError::failed("Failed to prepare message: text is empty"));
    }
    Ok(state)
}

async fn send_message(
    mut state: WorkflowState,
    ctx: StepContext,
    sender: &dyn MessageSender,
) -> Result<WorkflowState, StepError> {
    ctx.check_cancelled()?;

    let (handle, url) = current_profile(&state)
        .ok_or_else(|| StepError::failed("No profile selected for sending"))?;
    let text = state.get_str("message_text").unwrap_or_default().to_string();

    // pace messages; waking early if cancelled
    let delay = state.get_i64("delay_secs").unwrap_or(0).max(0) as u64;
    ctx.cancel_token().sleep(Duration::from_secs(delay)).await?;

    sender.send(&handle, &url, &text).await?;
    log::info!("[{}] message sent to @{}", ctx.thread_id(), handle);

    let mut sent = state
        .get("sent")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    sent.push(json!(handle));

    let processed = count(&state, "processed") + 1;
    let successful = count(&state, "successful") + 1;
    state.update("sent", Value::Array(sent))?;
    state.update("processed", json!(processed))?;
    state.update("successful", json!(successful))?;
    state.update("current_profile", Value::Null)?;
    state.update("message_text", Value::Null)?;
    Ok(state)
}

async fn skip_profile(mut state: WorkflowState, _ctx: StepContext) -> Result<WorkflowState, StepError> {
    if let Some((handle, _)) = current_profile(&state) {
        log::info!("Skipping @{}", handle);
    }
    let processed = count(&state, "processed") + 1;
    state.update("processed", json!(processed))?;
    state.update("current_profile", Value::Null)?;
    state.update("message_text", Value::Null)?;
    Ok(state)
}

async fn cancel_workflow(mut state: WorkflowState, _ctx: StepContext) -> Result<WorkflowState, StepError> {
    let result = summary(&state, false, "Workflow cancelled by user".to_string());
    state.update("automation_result", result)?;
    state.update("outreach_cancelled", json!(true))?;
    Ok(state)
}

async fn finalize_automation(mut state: WorkflowState, _ctx: StepContext) -> Result<WorkflowState, StepError> {
    if state.get("automation_result").is_none() {
        let message = format!(
            "Successfully processed {} profiles. Successfully messaged: {}",
            count(&state, "processed"),
            count(&state, "successful")
        );
        let result = summary(&state, true, message);
        state.update("automation_result", result)?;
    }
    if state.get_bool("outreach_cancelled") == Some(true) {
        state.status = WorkflowStatus::Cancelled;
    }
    Ok(state)
}
