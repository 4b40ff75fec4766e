// ABOUTME: Core domain models for applications, credentials, and authorization sessions
// ABOUTME: Encodes the session status state machine with explicit legal transitions
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered client application (relying party)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    /// Opaque 21-char URL-safe identifier, used as OAuth `client_id`
    pub id: String,
    /// Display name, unique per server instance
    pub name: String,
    /// Optional description shown on the consent screen
    pub description: Option<String>,
    /// Optional logo URL shown on the consent screen
    pub logo_url: Option<String>,
    /// While set and in the future, new authorization flows are refused
    pub suspend_until: Option<DateTime<Utc>>,
    /// Whether the RFC 8628 device flow is enabled for this application
    pub device_code_enabled: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Application {
    /// Whether the application is suspended at the given instant
    #[must_use]
    pub fn is_suspended(&self, now: DateTime<Utc>) -> bool {
        self.suspend_until.is_some_and(|until| until > now)
    }
}

/// Membership role within an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppRole {
    /// Can manage credentials and settings
    Admin,
    /// Admin plus deletion and membership management
    Root,
}

impl AppRole {
    /// Database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Root => "root",
        }
    }
}

/// A whitelisted redirect URI, compared byte-exact after trim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedUri {
    /// Row id
    pub id: i64,
    /// Owning application
    pub app_id: String,
    /// Optional label
    pub name: Option<String>,
    /// Exact URI string
    pub uri: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Metadata for a client secret; the bcrypt hash never leaves the store
#[derive(Debug, Clone, Serialize)]
pub struct ClientSecret {
    /// Row id
    pub id: i64,
    /// Owning application
    pub app_id: String,
    /// Optional label
    pub name: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Metadata for an API key; only the SHA-256 digest is persisted
#[derive(Debug, Clone, Serialize)]
pub struct ApiKey {
    /// Row id
    pub id: i64,
    /// Owning application
    pub app_id: String,
    /// Optional label
    pub name: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Which OAuth flow an authorization session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// Authorization code flow (RFC 6749 section 4.1, with PKCE)
    AuthorizationCode,
    /// Device authorization flow (RFC 8628)
    DeviceCode,
}

impl FlowType {
    /// Database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::DeviceCode => "device_code",
        }
    }

    /// Parse the database representation
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "device_code" => Some(Self::DeviceCode),
            _ => None,
        }
    }
}

/// Authorization session status
///
/// `Consumed`, `Denied`, and `Expired` are terminal; transition helpers
/// reject every exit from them so replayed codes cannot resurrect a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, waiting for the user's consent decision
    Pending,
    /// User approved; waiting for the code exchange or device poll
    Authorized,
    /// Tokens were issued; the session is spent
    Consumed,
    /// User denied the request
    Denied,
    /// Wall-clock passed `expires_at` before completion
    Expired,
}

impl SessionStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Consumed => "consumed",
            Self::Denied => "denied",
            Self::Expired => "expired",
        }
    }

    /// Parse the database representation
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "authorized" => Some(Self::Authorized),
            "consumed" => Some(Self::Consumed),
            "denied" => Some(Self::Denied),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Whether this status admits a transition to `next`
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Pending,
                Self::Authorized | Self::Denied | Self::Expired
            ) | (Self::Authorized, Self::Consumed | Self::Expired)
        )
    }

    /// Whether no further transitions are possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Consumed | Self::Denied | Self::Expired)
    }
}

/// A single user-authorization attempt, covering both OAuth flows
///
/// Per-flow columns are nullable; `flow_type` says which set is populated.
#[derive(Debug, Clone)]
pub struct AuthorizationSession {
    /// Opaque 32-char primary key
    pub session_id: String,
    /// Application the session belongs to
    pub client_id: String,
    /// Set once the user decides; weak reference, user deletion does not cascade
    pub username: Option<String>,
    /// Which flow this session drives
    pub flow_type: FlowType,
    /// Current status
    pub status: SessionStatus,
    /// Device flow: opaque 32-char code polled by the client
    pub device_code: Option<String>,
    /// Device flow: 8-char code the user types, stored upper-case
    pub user_code: Option<String>,
    /// Device flow: last poll instant, drives the slow_down rate limit
    pub last_poll: Option<DateTime<Utc>>,
    /// Code flow: validated redirect target
    pub redirect_uri: Option<String>,
    /// Code flow: PKCE challenge, empty/absent means client secret required
    pub code_challenge: Option<String>,
    /// Code flow: `plain` or `S256`
    pub code_challenge_method: Option<String>,
    /// Code flow: opaque client state echoed back on redirect
    pub state: Option<String>,
    /// Code flow: single-use authorization code, set at consent
    pub auth_code: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// `created_at` + 15 minutes
    pub expires_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl AuthorizationSession {
    /// Whether the wall clock has passed `expires_at`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// PKCE is in effect iff a non-empty challenge was stored at creation
    #[must_use]
    pub fn has_pkce(&self) -> bool {
        self.code_challenge.as_deref().is_some_and(|c| !c.is_empty())
    }
}
