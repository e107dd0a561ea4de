// End-to-end authentication ceremonies through the public service API
use passkey_verifier::testing::builders::{
    build_authenticator_data, client_data_json, AuthenticatorDataOptions,
};
use passkey_verifier::testing::constants::{TEST_CHALLENGE, TEST_ORIGIN, TEST_RP_ID};
use passkey_verifier::testing::TestCredential;
use passkey_verifier::webauthn::{
    encode_base64url, sha256, AuthenticationCredential, AuthenticatorAssertionResponse,
    AuthenticatorFlags, StoredCredential, TrustAnchors, UserVerificationPolicy, WebAuthnError,
    WebAuthnService, WebAuthnSettings,
};

const CREDENTIAL_ID: &[u8] = &[0x01, 0x02, 0x03, 0x04];
const UP_UV: u8 = AuthenticatorFlags::USER_PRESENT | AuthenticatorFlags::USER_VERIFIED;

fn service() -> WebAuthnService {
    let settings = WebAuthnSettings {
        rp_id: TEST_RP_ID.to_string(),
        rp_origin: TEST_ORIGIN.to_string(),
        user_verification: UserVerificationPolicy::Required,
        ..WebAuthnSettings::default()
    };
    WebAuthnService::new(settings, TrustAnchors::default()).expect("valid settings")
}

fn stored(key: &TestCredential, counter: u32) -> StoredCredential {
    StoredCredential {
        credential_id: CREDENTIAL_ID.to_vec(),
        public_key: key.cose_public_key(),
        counter,
    }
}

/// Raw assertion parts, so tests can tamper with them before encoding
#[derive(Clone)]
struct Assertion {
    client_data: Vec<u8>,
    authenticator_data: Vec<u8>,
    signature: Vec<u8>,
    user_handle: Option<Vec<u8>>,
}

impl Assertion {
    fn signed(key: &TestCredential, flags: u8, counter: u32) -> Self {
        let client_data = client_data_json("webauthn.get", TEST_CHALLENGE, TEST_ORIGIN);
        let authenticator_data = build_authenticator_data(&AuthenticatorDataOptions {
            flags,
            counter,
            ..AuthenticatorDataOptions::for_rp_id(TEST_RP_ID)
        });
        let mut signed = authenticator_data.clone();
        signed.extend_from_slice(&sha256(&client_data));
        Self {
            signature: key.sign(&signed),
            client_data,
            authenticator_data,
            user_handle: Some(b"user-1234".to_vec()),
        }
    }

    fn credential(&self) -> AuthenticationCredential {
        AuthenticationCredential {
            id: encode_base64url(CREDENTIAL_ID),
            raw_id: encode_base64url(CREDENTIAL_ID),
            response: AuthenticatorAssertionResponse {
                client_data_json: encode_base64url(&self.client_data),
                authenticator_data: encode_base64url(&self.authenticator_data),
                signature: encode_base64url(&self.signature),
                user_handle: self.user_handle.as_deref().map(encode_base64url),
            },
            client_extension_results: None,
            r#type: "public-key".to_string(),
        }
    }
}

#[test]
fn test_valid_assertion_advances_counter() {
    let key = TestCredential::generate();
    let assertion = Assertion::signed(&key, UP_UV, 6);

    let result = service()
        .finish_authentication(&assertion.credential(), TEST_CHALLENGE, &stored(&key, 5))
        .expect("assertion should verify");

    assert_eq!(result.credential_id, CREDENTIAL_ID);
    assert_eq!(result.counter, 6);
    assert!(result.user_verified);
    assert!(!result.backup_state);
    assert_eq!(result.user_handle.as_deref(), Some(&b"user-1234"[..]));
}

#[test]
fn test_replayed_counter_is_rejected() {
    let key = TestCredential::generate();
    let assertion = Assertion::signed(&key, UP_UV, 5);
    let result =
        service().finish_authentication(&assertion.credential(), TEST_CHALLENGE, &stored(&key, 5));
    assert!(matches!(
        result,
        Err(WebAuthnError::PotentialReplayOrClone {
            stored: 5,
            reported: 5
        })
    ));
}

#[test]
fn test_counter_going_backwards_is_rejected() {
    let key = TestCredential::generate();
    for reported in [0, 1, 9] {
        let assertion = Assertion::signed(&key, UP_UV, reported);
        let result = service().finish_authentication(
            &assertion.credential(),
            TEST_CHALLENGE,
            &stored(&key, 10),
        );
        assert!(
            matches!(result, Err(WebAuthnError::PotentialReplayOrClone { .. })),
            "reported {reported}"
        );
    }
}

#[test]
fn test_counterless_authenticator_is_accepted() {
    let key = TestCredential::generate();
    let assertion = Assertion::signed(&key, UP_UV, 0);
    let result = service()
        .finish_authentication(&assertion.credential(), TEST_CHALLENGE, &stored(&key, 0))
        .unwrap();
    assert_eq!(result.counter, 0);
}

#[test]
fn test_signature_tampering() {
    let key = TestCredential::generate();
    let valid = Assertion::signed(&key, UP_UV, 1);

    for i in 0..valid.signature.len() {
        let mut assertion = valid.clone();
        assertion.signature[i] ^= 0x01;
        let result = service().finish_authentication(
            &assertion.credential(),
            TEST_CHALLENGE,
            &stored(&key, 0),
        );
        assert!(
            matches!(result, Err(WebAuthnError::InvalidSignature)),
            "signature byte {i}"
        );
    }
}

#[test]
fn test_authenticator_data_tampering() {
    let key = TestCredential::generate();
    let valid = Assertion::signed(&key, UP_UV, 1);

    // rpIdHash and flags changes fail earlier checks; counter bytes reach
    // signature verification while staying above the stored zero
    for i in 33..valid.authenticator_data.len() {
        let mut assertion = valid.clone();
        assertion.authenticator_data[i] ^= 0x80;
        let result = service().finish_authentication(
            &assertion.credential(),
            TEST_CHALLENGE,
            &stored(&key, 0),
        );
        assert!(
            matches!(result, Err(WebAuthnError::InvalidSignature)),
            "authenticator data byte {i}"
        );
    }
}

#[test]
fn test_client_data_tampering() {
    let key = TestCredential::generate();
    let mut assertion = Assertion::signed(&key, UP_UV, 1);
    // Whitespace keeps the JSON valid and every field intact
    assertion.client_data.push(b' ');
    let result =
        service().finish_authentication(&assertion.credential(), TEST_CHALLENGE, &stored(&key, 0));
    assert!(matches!(result, Err(WebAuthnError::InvalidSignature)));
}

#[test]
fn test_flags_are_enforced() {
    let key = TestCredential::generate();

    let no_presence = Assertion::signed(&key, AuthenticatorFlags::USER_VERIFIED, 1);
    let result = service().finish_authentication(
        &no_presence.credential(),
        TEST_CHALLENGE,
        &stored(&key, 0),
    );
    assert!(matches!(result, Err(WebAuthnError::UserPresentNotSet)));

    let no_verification = Assertion::signed(&key, AuthenticatorFlags::USER_PRESENT, 1);
    let result = service().finish_authentication(
        &no_verification.credential(),
        TEST_CHALLENGE,
        &stored(&key, 0),
    );
    assert!(matches!(result, Err(WebAuthnError::UserVerifiedNotSet)));
}

#[test]
fn test_challenge_and_origin_mutations() {
    let key = TestCredential::generate();

    for i in 0..TEST_CHALLENGE.len() {
        let mut challenge = TEST_CHALLENGE.to_vec();
        challenge[i] ^= 0x01;
        let assertion = Assertion::signed(&key, UP_UV, 1);
        let result =
            service().finish_authentication(&assertion.credential(), &challenge, &stored(&key, 0));
        assert!(
            matches!(result, Err(WebAuthnError::ChallengeMismatch)),
            "challenge byte {i}"
        );
    }

    let mut assertion = Assertion::signed(&key, UP_UV, 1);
    assertion.client_data =
        client_data_json("webauthn.get", TEST_CHALLENGE, "https://example.com:8443");
    let result =
        service().finish_authentication(&assertion.credential(), TEST_CHALLENGE, &stored(&key, 0));
    assert!(matches!(result, Err(WebAuthnError::OriginMismatch { .. })));
}

#[test]
fn test_create_client_data_is_not_an_assertion() {
    let key = TestCredential::generate();
    let mut assertion = Assertion::signed(&key, UP_UV, 1);
    assertion.client_data = client_data_json("webauthn.create", TEST_CHALLENGE, TEST_ORIGIN);
    let result =
        service().finish_authentication(&assertion.credential(), TEST_CHALLENGE, &stored(&key, 0));
    assert!(matches!(result, Err(WebAuthnError::CeremonyTypeMismatch { .. })));
}

#[test]
fn test_assertion_for_other_credential() {
    let key = TestCredential::generate();
    let assertion = Assertion::signed(&key, UP_UV, 1);
    let mut record = stored(&key, 0);
    record.credential_id = vec![0xff];
    let result = service().finish_authentication(&assertion.credential(), TEST_CHALLENGE, &record);
    assert!(matches!(result, Err(WebAuthnError::CredentialMismatch)));
}

#[test]
fn test_wrong_key_is_invalid_signature() {
    let key = TestCredential::generate();
    let other = TestCredential::generate();
    let assertion = Assertion::signed(&key, UP_UV, 1);
    let result = service().finish_authentication(
        &assertion.credential(),
        TEST_CHALLENGE,
        &stored(&other, 0),
    );
    assert!(matches!(result, Err(WebAuthnError::InvalidSignature)));
}

#[test]
fn test_empty_user_handle_is_absent() {
    let key = TestCredential::generate();
    let mut assertion = Assertion::signed(&key, UP_UV, 1);
    assertion.user_handle = Some(Vec::new());
    let result = service()
        .finish_authentication(&assertion.credential(), TEST_CHALLENGE, &stored(&key, 0))
        .unwrap();
    assert!(result.user_handle.is_none());
}

#[test]
fn test_assertion_for_other_relying_party() {
    let key = TestCredential::generate();
    let client_data = client_data_json("webauthn.get", TEST_CHALLENGE, TEST_ORIGIN);
    let authenticator_data = build_authenticator_data(&AuthenticatorDataOptions {
        flags: UP_UV,
        counter: 1,
        ..AuthenticatorDataOptions::for_rp_id("other.com")
    });
    let mut signed = authenticator_data.clone();
    signed.extend_from_slice(&sha256(&client_data));
    let assertion = Assertion {
        signature: key.sign(&signed),
        client_data,
        authenticator_data,
        user_handle: None,
    };

    let result =
        service().finish_authentication(&assertion.credential(), TEST_CHALLENGE, &stored(&key, 0));
    assert!(matches!(result, Err(WebAuthnError::RelyingPartyIdMismatch)));
}

#[test]
fn test_credential_checks_precede_ceremony_checks() {
    let key = TestCredential::generate();
    let mut assertion = Assertion::signed(&key, UP_UV, 1);
    assertion.client_data = client_data_json("webauthn.get", b"stale challenge", TEST_ORIGIN);

    let mut record = stored(&key, 0);
    record.credential_id = vec![0xff];
    let result = service().finish_authentication(&assertion.credential(), TEST_CHALLENGE, &record);
    assert!(matches!(result, Err(WebAuthnError::CredentialMismatch)));

    let rsa_only = WebAuthnService::new(
        WebAuthnSettings {
            rp_id: TEST_RP_ID.to_string(),
            rp_origin: TEST_ORIGIN.to_string(),
            supported_algorithms: vec![-257],
            ..WebAuthnSettings::default()
        },
        TrustAnchors::default(),
    )
    .unwrap();
    let result =
        rsa_only.finish_authentication(&assertion.credential(), TEST_CHALLENGE, &stored(&key, 0));
    assert!(matches!(result, Err(WebAuthnError::UnsupportedAlgorithm(-7))));
}
