//! Challenge submission for identifiers.
//!
//! Talking to the certificate authority is the job of a [`ChallengeClient`];
//! this module resolves the identifier, hands its authorization state to the
//! client and records the returned challenge in the vault.

use crate::error::{Result, VaultError};
use crate::model::Registration;
use crate::storage::VaultStore;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeType {
    Dns01,
    Http01,
    /// Pre-standard DNS challenge.
    LegacyDns,
    /// Pre-standard `simpleHttp` challenge.
    LegacyHttp,
}

impl ChallengeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeType::Dns01 => "dns-01",
            ChallengeType::Http01 => "http-01",
            ChallengeType::LegacyDns => "dns",
            ChallengeType::LegacyHttp => "simpleHttp",
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeType {
    type Err = VaultError;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self> {
        [
            ChallengeType::Dns01,
            ChallengeType::Http01,
            ChallengeType::LegacyDns,
            ChallengeType::LegacyHttp,
        ]
        .into_iter()
        .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| VaultError::InvalidChallengeType(s.to_string()))
    }
}

/// The protocol client that submits challenge answers to the authority.
pub trait ChallengeClient {
    /// Submit the answer for `challenge` and return the challenge record the
    /// authority responded with.
    fn submit_challenge_answer(
        &self,
        registration: &Registration,
        authorization: &Value,
        challenge: ChallengeType,
        use_base_uri: bool,
    ) -> Result<Value>;
}

/// Submit a challenge for the identifier `reference` resolves to, store the
/// returned record and save the vault.
///
/// Returns the identifier's authorization state.
pub fn submit_challenge<C: ChallengeClient + ?Sized>(
    store: &mut VaultStore,
    reference: &str,
    challenge: ChallengeType,
    use_base_uri: bool,
    client: &C,
) -> Result<Value> {
    let mut vault = store.load_required()?;
    let registration = vault.active_registration()?.clone();

    let identifier = vault.identifier_by_ref_mut(reference)?;
    let record = client.submit_challenge_answer(
        &registration,
        &identifier.authorization,
        challenge,
        use_base_uri,
    )?;
    identifier
        .challenges
        .insert(challenge.as_str().to_string(), record);
    let authorization = identifier.authorization.clone();
    let dns = identifier.dns.clone();

    store.save(&vault)?;
    info!(identifier = %dns, challenge = %challenge, "submitted challenge");
    Ok(authorization)
}
