use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Broker connectivity states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrokerConnectionState {
    /// Never probed
    #[default]
    Unknown,
    /// No access token is stored
    NoToken,
    /// Token present but rejected by the broker
    TokenExpired,
    /// Session creation in progress
    Connecting,
    /// Session validated
    Connected,
    /// Session could not be created
    Failed,
    /// Session was down and has been re-established
    Reconnected,
    /// Waiting for an operator to refresh credentials
    ManualInterventionRequired,
}

impl BrokerConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerConnectionState::Unknown => "UNKNOWN",
            BrokerConnectionState::NoToken => "NO_TOKEN",
            BrokerConnectionState::TokenExpired => "TOKEN_EXPIRED",
            BrokerConnectionState::Connecting => "CONNECTING",
            BrokerConnectionState::Connected => "CONNECTED",
            BrokerConnectionState::Failed => "FAILED",
            BrokerConnectionState::Reconnected => "RECONNECTED",
            BrokerConnectionState::ManualInterventionRequired => "MANUAL_INTERVENTION_REQUIRED",
        }
    }

    /// A usable session exists
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            BrokerConnectionState::Connected | BrokerConnectionState::Reconnected
        )
    }

    /// Only an operator action can move the broker out of this state
    pub fn requires_operator(&self) -> bool {
        matches!(self, BrokerConnectionState::ManualInterventionRequired)
    }

    /// Check if this state can transition to another state
    ///
    /// `ManualInterventionRequired` is terminal until a probe observes a
    /// fresh valid token.
    pub fn can_transition_to(&self, target: BrokerConnectionState) -> bool {
        use BrokerConnectionState::*;

        match (self, target) {
            (ManualInterventionRequired, Connected) => true,
            (ManualInterventionRequired, Reconnected) => true,
            (ManualInterventionRequired, ManualInterventionRequired) => true,
            (ManualInterventionRequired, _) => false,

            // Manual intervention is only reached through an expired token
            (TokenExpired, ManualInterventionRequired) => true,
            (_, ManualInterventionRequired) => false,

            _ => true,
        }
    }
}

impl fmt::Display for BrokerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for BrokerConnectionState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "UNKNOWN" => Ok(BrokerConnectionState::Unknown),
            "NO_TOKEN" => Ok(BrokerConnectionState::NoToken),
            "TOKEN_EXPIRED" => Ok(BrokerConnectionState::TokenExpired),
            "CONNECTING" => Ok(BrokerConnectionState::Connecting),
            "CONNECTED" => Ok(BrokerConnectionState::Connected),
            "FAILED" => Ok(BrokerConnectionState::Failed),
            "RECONNECTED" => Ok(BrokerConnectionState::Reconnected),
            "MANUAL_INTERVENTION_REQUIRED" => Ok(BrokerConnectionState::ManualInterventionRequired),
            _ => Err(format!("Unknown broker state: {}", s)),
        }
    }
}

/// Supported broker integrations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    /// Session-token broker (Kite Connect)
    #[default]
    Zerodha,
    /// Credential + TOTP broker (SmartAPI)
    AngelOne,
}

impl BrokerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerKind::Zerodha => "zerodha",
            BrokerKind::AngelOne => "angelone",
        }
    }
}

impl fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BrokerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zerodha" | "kite" => Ok(BrokerKind::Zerodha),
            "angelone" | "angel" | "smartapi" => Ok(BrokerKind::AngelOne),
            other => Err(format!("Use broker as 'zerodha' or 'angelone' (got '{}')", other)),
        }
    }
}

/// Broker section of the status store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerStatus {
    pub kind: BrokerKind,
    pub state: BrokerConnectionState,
    /// Provider diagnostic, verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub updated_at: DateTime<FixedOffset>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_intervention_is_terminal() {
        let state = BrokerConnectionState::ManualInterventionRequired;
        assert!(!state.can_transition_to(BrokerConnectionState::TokenExpired));
        assert!(!state.can_transition_to(BrokerConnectionState::NoToken));
        assert!(!state.can_transition_to(BrokerConnectionState::Failed));
        assert!(state.can_transition_to(BrokerConnectionState::Connected));
    }

    #[test]
    fn test_manual_intervention_only_from_expired_token() {
        assert!(BrokerConnectionState::TokenExpired
            .can_transition_to(BrokerConnectionState::ManualInterventionRequired));
        assert!(!BrokerConnectionState::NoToken
            .can_transition_to(BrokerConnectionState::ManualInterventionRequired));
    }

    #[test]
    fn test_state_string_roundtrip() {
        let state = BrokerConnectionState::try_from("manual_intervention_required").unwrap();
        assert_eq!(state, BrokerConnectionState::ManualInterventionRequired);
        assert_eq!(
            serde_json::to_string(&BrokerConnectionState::NoToken).unwrap(),
            "\"NO_TOKEN\""
        );
    }

    #[test]
    fn test_broker_kind_parse() {
        assert_eq!("Zerodha".parse::<BrokerKind>().unwrap(), BrokerKind::Zerodha);
        assert_eq!("angelone".parse::<BrokerKind>().unwrap(), BrokerKind::AngelOne);
        assert!("upstox".parse::<BrokerKind>().is_err());
    }
}
