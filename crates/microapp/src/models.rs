//! Request bodies and response types for the platform endpoints.
//!
//! Field order in the serialized bodies is the declaration order below. The
//! user-storage bodies are signed over their exact serialized bytes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Maximum byte length of a user-storage key or value.
pub const USER_STORAGE_MAX_LEN: usize = 1024;

/// Checks performed by the image moderation endpoint when none are given.
pub const DEFAULT_IMAGE_TARGETS: [&str; 4] = ["ad", "porn", "politics", "disgusting"];

/// Result of exchanging a login code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Code2Session {
    pub session_key: String,
    pub openid: String,
    pub anonymous_openid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unionid: Option<String>,
}

/// One user-storage entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KvItem {
    pub key: String,
    pub value: String,
}

impl KvItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_storage_len("key", &self.key)?;
        check_storage_len("value", &self.value)
    }
}

pub(crate) fn check_storage_len(what: &str, s: &str) -> Result<()> {
    if s.len() >= USER_STORAGE_MAX_LEN {
        return Err(Error::invalid_argument(format!(
            "user storage {what} must be shorter than {USER_STORAGE_MAX_LEN} bytes"
        )));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub(crate) struct SetUserStorageBody<'a> {
    pub kv_list: &'a [KvItem],
}

#[derive(Debug, Serialize)]
pub(crate) struct RemoveUserStorageBody<'a> {
    pub key: &'a [String],
}

/// Host app a QR code opens in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AppName {
    Toutiao,
    Douyin,
    Pipixia,
    Huoshan,
}

impl AppName {
    /// Parse a host app name, rejecting anything unsupported.
    pub fn parse(value: &str) -> Result<Self> {
        value.parse().map_err(|_| {
            Error::invalid_argument(format!(
                "unsupported appname {value:?}, expected one of {}",
                <Self as strum::VariantNames>::VARIANTS.join(", ")
            ))
        })
    }
}

/// RGB colour used by QR code rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Optional QR code parameters. Unset fields use the platform defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QrCodeOptions {
    pub appname: Option<AppName>,
    /// Page opened by the code, including its query string.
    pub path: Option<String>,
    /// Edge length in pixels.
    pub width: Option<u32>,
    pub line_color: Option<Rgb>,
    pub background: Option<Rgb>,
    /// Draw the app icon in the centre.
    pub set_icon: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QrCodeBody<'a> {
    pub access_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appname: Option<AppName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_color: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_icon: Option<bool>,
}

impl<'a> QrCodeBody<'a> {
    pub fn new(access_token: &'a str, options: &'a QrCodeOptions) -> Self {
        Self {
            access_token,
            appname: options.appname,
            path: options.path.as_deref(),
            width: options.width,
            line_color: options.line_color,
            background: options.background,
            set_icon: options.set_icon,
        }
    }
}

/// Generated QR code image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrCode {
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Serialize)]
pub(crate) struct TemplateMessage<'a> {
    pub access_token: &'a str,
    pub app_id: &'a str,
    pub data: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<&'a str>,
    pub form_id: &'a str,
    pub touser: &'a str,
    pub template_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubscribeMessage<'a> {
    pub access_token: &'a str,
    pub app_id: &'a str,
    pub tpl_id: &'a str,
    pub open_id: &'a str,
    pub data: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TextAntidirtBody<'a> {
    pub tasks: &'a [Value],
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageAntidirtBody<'a> {
    pub targets: Vec<&'a str>,
    pub tasks: &'a [Value],
}
