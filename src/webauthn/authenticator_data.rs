//! Authenticator data parsing
//!
//! The binary layout is:
//! - 32 bytes: RP ID hash
//! - 1 byte: flags
//! - 4 bytes: signature counter (big-endian)
//! - variable: attested credential data (if the AT flag is set)
//!   - 16 bytes: AAGUID
//!   - 2 bytes: credential ID length (L, big-endian)
//!   - L bytes: credential ID
//!   - variable: COSE public key (one CBOR item)
//! - variable: extensions (if the ED flag is set)

use uuid::Uuid;

use super::cbor;
use super::errors::WebAuthnError;

const RP_ID_HASH_LEN: usize = 32;
const FIXED_LEN: usize = RP_ID_HASH_LEN + 1 + 4;
const AAGUID_LEN: usize = 16;

/// Authenticator flags byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatorFlags(u8);

impl AuthenticatorFlags {
    pub const USER_PRESENT: u8 = 0b0000_0001;
    pub const USER_VERIFIED: u8 = 0b0000_0100;
    pub const BACKUP_ELIGIBLE: u8 = 0b0000_1000;
    pub const BACKUP_STATE: u8 = 0b0001_0000;
    pub const ATTESTED_CREDENTIAL_DATA: u8 = 0b0100_0000;
    pub const EXTENSION_DATA: u8 = 0b1000_0000;

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn user_present(self) -> bool {
        self.0 & Self::USER_PRESENT != 0
    }

    #[must_use]
    pub const fn user_verified(self) -> bool {
        self.0 & Self::USER_VERIFIED != 0
    }

    #[must_use]
    pub const fn backup_eligible(self) -> bool {
        self.0 & Self::BACKUP_ELIGIBLE != 0
    }

    #[must_use]
    pub const fn backup_state(self) -> bool {
        self.0 & Self::BACKUP_STATE != 0
    }

    #[must_use]
    pub const fn attested_credential_data_included(self) -> bool {
        self.0 & Self::ATTESTED_CREDENTIAL_DATA != 0
    }

    #[must_use]
    pub const fn extension_data_included(self) -> bool {
        self.0 & Self::EXTENSION_DATA != 0
    }
}

/// Credential data attested during registration.
///
/// Handed to the caller for durable storage; nothing here is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// COSE-encoded credential public key, exactly as sent by the authenticator
    pub credential_public_key: Vec<u8>,
}

impl AttestedCredentialData {
    /// AAGUID as a UUID, for logging and metadata lookups
    #[must_use]
    pub fn aaguid_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.aaguid)
    }
}

/// Parsed authenticator data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub relying_party_id_hash: [u8; 32],
    pub flags: AuthenticatorFlags,
    pub counter: u32,
    pub attested_credential_data: Option<AttestedCredentialData>,
    /// Opaque CBOR extension bytes
    pub extensions: Option<Vec<u8>>,
}

impl AuthenticatorData {
    /// Parse the binary authenticator data structure
    ///
    /// # Errors
    /// Returns `WebAuthnError::MalformedAuthenticatorData` if the data is
    /// truncated, has trailing bytes, or its flags disagree with its content
    pub fn parse(bytes: &[u8]) -> Result<Self, WebAuthnError> {
        if bytes.len() < FIXED_LEN {
            return Err(malformed(format!(
                "need at least {FIXED_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let mut relying_party_id_hash = [0u8; 32];
        relying_party_id_hash.copy_from_slice(&bytes[..RP_ID_HASH_LEN]);
        let flags = AuthenticatorFlags::from_bits(bytes[RP_ID_HASH_LEN]);
        let counter = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let mut pos = FIXED_LEN;

        let attested_credential_data = if flags.attested_credential_data_included() {
            let (data, consumed) = parse_attested_credential_data(&bytes[pos..])?;
            pos += consumed;
            Some(data)
        } else {
            None
        };

        let remaining = &bytes[pos..];
        let extensions = if flags.extension_data_included() {
            if remaining.is_empty() {
                return Err(malformed("extension data flag set but no extension data"));
            }
            Some(remaining.to_vec())
        } else {
            if !remaining.is_empty() {
                return Err(malformed(format!(
                    "{} unexpected trailing bytes",
                    remaining.len()
                )));
            }
            None
        };

        Ok(Self {
            relying_party_id_hash,
            flags,
            counter,
            attested_credential_data,
            extensions,
        })
    }

    /// Serialize back into the binary layout
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FIXED_LEN);
        out.extend_from_slice(&self.relying_party_id_hash);
        out.push(self.flags.bits());
        out.extend_from_slice(&self.counter.to_be_bytes());
        if let Some(acd) = &self.attested_credential_data {
            out.extend_from_slice(&acd.aaguid);
            // Parsed data never exceeds u16::MAX; the length prefix was read from two bytes.
            let id_len = u16::try_from(acd.credential_id.len()).unwrap_or(u16::MAX);
            out.extend_from_slice(&id_len.to_be_bytes());
            out.extend_from_slice(&acd.credential_id);
            out.extend_from_slice(&acd.credential_public_key);
        }
        if let Some(extensions) = &self.extensions {
            out.extend_from_slice(extensions);
        }
        out
    }
}

fn parse_attested_credential_data(
    bytes: &[u8],
) -> Result<(AttestedCredentialData, usize), WebAuthnError> {
    if bytes.len() < AAGUID_LEN + 2 {
        return Err(malformed(
            "attested credential data flag set but data too short for AAGUID and length",
        ));
    }

    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&bytes[..AAGUID_LEN]);
    let id_len = usize::from(u16::from_be_bytes([bytes[16], bytes[17]]));
    let mut pos = AAGUID_LEN + 2;

    if bytes.len() < pos + id_len {
        return Err(malformed(format!(
            "credential ID length {id_len} exceeds remaining {} bytes",
            bytes.len() - pos
        )));
    }
    let credential_id = bytes[pos..pos + id_len].to_vec();
    pos += id_len;

    if bytes.len() == pos {
        return Err(malformed("credential public key missing"));
    }
    let (key, key_len) = cbor::decode_prefix(&bytes[pos..])
        .map_err(|e| malformed(format!("credential public key: {e}")))?;
    if !key.is_map() {
        return Err(malformed("credential public key is not a COSE map"));
    }
    let credential_public_key = bytes[pos..pos + key_len].to_vec();
    pos += key_len;

    Ok((
        AttestedCredentialData {
            aaguid,
            credential_id,
            credential_public_key,
        },
        pos,
    ))
}

fn malformed(reason: impl Into<String>) -> WebAuthnError {
    WebAuthnError::MalformedAuthenticatorData(reason.into())
}
