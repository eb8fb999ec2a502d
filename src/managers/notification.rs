//! Job outcome notifications
//!
//! Each finished job produces one [`NotificationOutcome`]. The [`NotificationManager`]
//! renders it and hands it to every configured channel (email, Telegram). A channel that
//! fails is logged and skipped; notifications never change a job's result.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{check_env_vars, lookup, parse_bool, EnvSource, Secret};

/// Variables that enable the email channel
pub const MAIL_VARS: &[&str] = &[
    "MAIL_HOST",
    "MAIL_PORT",
    "MAIL_USERNAME",
    "MAIL_PASSWORD",
    "MAIL_FROM",
    "MAIL_TO",
];

/// Variables that enable the Telegram channel
pub const TELEGRAM_VARS: &[&str] = &["TG_TOKEN", "TG_CHAT_ID"];

const TELEGRAM_API: &str = "https://api.telegram.org";
const MAX_ERROR_LEN: usize = 500;
const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d at %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Backup,
    Restore,
}

impl JobKind {
    fn title(&self) -> &'static str {
        match self {
            JobKind::Backup => "Backup",
            JobKind::Restore => "Restore",
        }
    }
}

/// Everything a channel needs to report one finished job
#[derive(Debug, Clone, Serialize)]
pub struct NotificationOutcome {
    pub job: JobKind,
    pub file: String,
    /// Artifact size in bytes
    pub size: u64,
    pub backend: String,
    pub location: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub error: Option<String>,
    pub reference: Option<String>,
}

impl NotificationOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn duration_secs(&self) -> u64 {
        self.finished_at
            .signed_duration_since(self.started_at)
            .num_seconds()
            .max(0) as u64
    }
}

/// Receives the outcome of every job run
pub trait Notifier: Send + Sync {
    fn notify(&self, outcome: &NotificationOutcome);
}

/// A single delivery transport
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;
    fn send(&self, outcome: &NotificationOutcome) -> Result<()>;
}

/// Fans an outcome out to the configured channels
#[derive(Default)]
pub struct NotificationManager {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl NotificationManager {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// A manager with no channels
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Enable each channel whose variables are all present
    pub fn from_env(env: &dyn EnvSource) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        if check_env_vars(env, MAIL_VARS).is_empty() {
            match EmailChannel::from_env(env) {
                Ok(channel) => channels.push(Box::new(channel)),
                Err(e) => warn!("Email notifications disabled: {:#}", e),
            }
        } else {
            debug!("Email notifications not configured");
        }

        if check_env_vars(env, TELEGRAM_VARS).is_empty() {
            channels.push(Box::new(TelegramChannel::new(
                lookup(env, "TG_TOKEN").unwrap_or_default(),
                lookup(env, "TG_CHAT_ID").unwrap_or_default(),
            )));
        } else {
            debug!("Telegram notifications not configured");
        }

        Self { channels }
    }

    pub fn is_enabled(&self) -> bool {
        !self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }
}

impl Notifier for NotificationManager {
    fn notify(&self, outcome: &NotificationOutcome) {
        match serde_json::to_string(outcome) {
            Ok(json) => debug!("Notification outcome: {}", json),
            Err(e) => warn!("Could not serialize notification outcome: {}", e),
        }

        for channel in &self.channels {
            info!("Sending {} notification...", channel.name());
            match channel.send(outcome) {
                Ok(()) => info!("{} notification has been sent", channel.name()),
                Err(e) => error!("Could not send {} notification: {:#}", channel.name(), e),
            }
        }
    }
}

/// SMTP delivery with an HTML body
pub struct EmailChannel {
    host: String,
    port: u16,
    username: String,
    password: Secret,
    from: String,
    to: Vec<String>,
    skip_tls_verify: bool,
}

impl EmailChannel {
    pub fn from_env(env: &dyn EnvSource) -> Result<Self> {
        let port_value = lookup(env, "MAIL_PORT").unwrap_or_default();
        let port = port_value
            .trim()
            .parse::<u16>()
            .with_context(|| format!("Invalid MAIL_PORT: {}", port_value))?;

        let skip_tls_verify = match lookup(env, "MAIL_SKIP_TLS") {
            Some(value) => parse_bool("MAIL_SKIP_TLS", &value)?,
            None => false,
        };

        let to: Vec<String> = lookup(env, "MAIL_TO")
            .unwrap_or_default()
            .split(',')
            .map(|addr| addr.trim().to_string())
            .filter(|addr| !addr.is_empty())
            .collect();

        Ok(Self {
            host: lookup(env, "MAIL_HOST").unwrap_or_default(),
            port,
            username: lookup(env, "MAIL_USERNAME").unwrap_or_default(),
            password: Secret::new(lookup(env, "MAIL_PASSWORD").unwrap_or_default()),
            from: lookup(env, "MAIL_FROM").unwrap_or_default(),
            to,
            skip_tls_verify,
        })
    }

    pub fn recipients(&self) -> &[String] {
        &self.to
    }

    fn build_message(&self, outcome: &NotificationOutcome) -> Result<Message> {
        let from: Mailbox = self
            .from
            .parse()
            .with_context(|| format!("Invalid MAIL_FROM address: {}", self.from))?;

        let mut builder = Message::builder()
            .from(from)
            .subject(render_subject(outcome))
            .header(ContentType::TEXT_HTML);
        for recipient in &self.to {
            let mailbox: Mailbox = recipient
                .parse()
                .with_context(|| format!("Invalid MAIL_TO address: {}", recipient))?;
            builder = builder.to(mailbox);
        }

        builder
            .body(render_html(outcome))
            .context("Failed to build email message")
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let params = TlsParameters::builder(self.host.clone())
            .dangerous_accept_invalid_certs(self.skip_tls_verify)
            .build()
            .context("Failed to configure TLS")?;
        let tls = if self.port == 465 {
            Tls::Wrapper(params)
        } else {
            Tls::Opportunistic(params)
        };

        Ok(SmtpTransport::builder_dangerous(self.host.as_str())
            .port(self.port)
            .tls(tls)
            .credentials(Credentials::new(
                self.username.clone(),
                self.password.expose().to_string(),
            ))
            .timeout(Some(Duration::from_secs(30)))
            .build())
    }
}

impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn send(&self, outcome: &NotificationOutcome) -> Result<()> {
        let message = self.build_message(outcome)?;
        self.transport()?
            .send(&message)
            .context("Failed to send email")?;
        Ok(())
    }
}

/// Telegram bot message
pub struct TelegramChannel {
    token: Secret,
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct TelegramPayload<'a> {
    chat_id: &'a str,
    text: String,
}

impl TelegramChannel {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            token: Secret::new(token),
            chat_id: chat_id.into(),
        }
    }

    fn url(&self) -> String {
        format!("{}/bot{}/sendMessage", TELEGRAM_API, self.token.expose())
    }
}

impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn send(&self, outcome: &NotificationOutcome) -> Result<()> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let payload = TelegramPayload {
            chat_id: &self.chat_id,
            text: render_text(outcome),
        };

        let response = client
            .post(self.url())
            .json(&payload)
            .send()
            .context("Failed to send Telegram message")?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().unwrap_or_default();
            anyhow::bail!("Telegram API returned status {}: {}", status, body)
        }
    }
}

pub fn render_subject(outcome: &NotificationOutcome) -> String {
    if outcome.is_success() {
        format!("✅ Volume {} Notification", outcome.job.title())
    } else {
        format!("🔴 Urgent: Volume {} Failure Notification", outcome.job.title())
    }
}

/// Plain-text message (Telegram)
pub fn render_text(outcome: &NotificationOutcome) -> String {
    let mut lines = Vec::new();

    match &outcome.error {
        None => lines.push(format!("[✅ {} Success]", outcome.job.title())),
        Some(_) => lines.push(format!("[🔴 {} Failure]", outcome.job.title())),
    }
    if !outcome.file.is_empty() {
        lines.push(format!("- File: {}", outcome.file));
    }
    if outcome.is_success() {
        lines.push(format!("- Size: {}", format_size(outcome.size)));
    }
    lines.push(format!("- Storage: {}", outcome.backend));
    if !outcome.location.is_empty() {
        lines.push(format!("- Location: {}", outcome.location));
    }
    lines.push(format!(
        "- Start time: {}",
        outcome.started_at.format(DISPLAY_TIME_FORMAT)
    ));
    lines.push(format!(
        "- End time: {}",
        outcome.finished_at.format(DISPLAY_TIME_FORMAT)
    ));
    lines.push(format!("- Duration: {}", format_duration(outcome.duration_secs())));
    if let Some(reference) = &outcome.reference {
        lines.push(format!("- Reference: {}", reference));
    }
    if let Some(error) = &outcome.error {
        lines.push(format!("- Error: {}", truncate_error(error)));
    }

    lines.join("\n")
}

/// HTML body (email)
pub fn render_html(outcome: &NotificationOutcome) -> String {
    let mut rows = Vec::new();
    let mut row = |label: &str, value: &str| {
        rows.push(format!(
            "<tr><td><strong>{}</strong></td><td>{}</td></tr>",
            label,
            escape_html(value)
        ));
    };

    if !outcome.file.is_empty() {
        row("File", &outcome.file);
    }
    if outcome.is_success() {
        row("Size", &format_size(outcome.size));
    }
    row("Storage", &outcome.backend);
    if !outcome.location.is_empty() {
        row("Location", &outcome.location);
    }
    row(
        "Start time",
        &outcome.started_at.format(DISPLAY_TIME_FORMAT).to_string(),
    );
    row(
        "End time",
        &outcome.finished_at.format(DISPLAY_TIME_FORMAT).to_string(),
    );
    row("Duration", &format_duration(outcome.duration_secs()));
    if let Some(reference) = &outcome.reference {
        row("Reference", reference);
    }

    let (heading, color) = if outcome.is_success() {
        (format!("{} completed successfully", outcome.job.title()), "#2ECC71")
    } else {
        (format!("{} failed", outcome.job.title()), "#E74C3C")
    };

    let error = outcome
        .error
        .as_deref()
        .map(|e| format!("<h3>Error</h3><pre>{}</pre>", escape_html(&truncate_error(e))))
        .unwrap_or_default();

    format!(
        "<!DOCTYPE html>\n<html><body>\
         <h2 style=\"color: {color}\">{heading}</h2>\
         <table>{rows}</table>{error}\
         <p>volume-backup</p>\
         </body></html>",
        color = color,
        heading = heading,
        rows = rows.join(""),
        error = error,
    )
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn truncate_error(error: &str) -> String {
    if error.chars().count() > MAX_ERROR_LEN {
        let head: String = error.chars().take(MAX_ERROR_LEN - 3).collect();
        format!("{}...", head)
    } else {
        error.to_string()
    }
}

/// Format a byte count in binary units
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// Format duration in human-readable form
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        let minutes = seconds / 60;
        let secs = seconds % 60;
        if secs == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, secs)
        }
    } else {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}
