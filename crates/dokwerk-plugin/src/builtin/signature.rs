// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Digest signature plugin: SHA-256 fingerprints for tamper detection.
//
// `sign` leaves the payload untouched and returns a detached digest in the
// output metadata; `verify` compares the payload against a digest supplied in
// the `digest` parameter.

use std::sync::Mutex;

use dokwerk_core::error::Result;
use dokwerk_core::{Capability, PluginConfig};
use dokwerk_document::formats::fingerprint;
use serde_json::json;
use tracing::{debug, info};

use crate::plugin::{Plugin, PluginInput, PluginOutput};

pub const NAME: &str = "digest-signature";

#[derive(Debug, Default)]
pub struct DigestSignaturePlugin {
    /// Signer identity from the `signer` setting.
    signer: Mutex<Option<String>>,
}

impl DigestSignaturePlugin {
    pub fn new() -> Self {
        Self::default()
    }

    fn signer(&self) -> Option<String> {
        self.signer.lock().map(|s| s.clone()).unwrap_or(None)
    }

    fn sign(&self, input: &PluginInput) -> PluginOutput {
        let digest = fingerprint(&input.data);
        debug!(%digest, "Payload signed");
        PluginOutput::success(input.data.clone(), input.format.clone())
            .with_metadata("algorithm", json!("sha256"))
            .with_metadata("digest", json!(digest))
            .with_metadata("signer", json!(self.signer()))
            .with_metadata("signed_at", json!(chrono::Utc::now().to_rfc3339()))
    }

    fn verify(&self, input: &PluginInput) -> PluginOutput {
        let Some(expected) = input.parameter_str("digest") else {
            return PluginOutput::failure("verify requires a `digest` parameter");
        };
        let actual = fingerprint(&input.data);
        if actual.eq_ignore_ascii_case(expected.trim()) {
            PluginOutput::success(Vec::new(), input.format.clone())
                .with_metadata("verified", json!(true))
                .with_metadata("digest", json!(actual))
        } else {
            PluginOutput::failure(format!("digest mismatch: expected {expected}, got {actual}"))
                .with_metadata("verified", json!(false))
        }
    }
}

impl Plugin for DigestSignaturePlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Detached SHA-256 document digests for signing and verification"
    }

    fn author(&self) -> &str {
        "Dokwerk"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::DigitalSignature]
    }

    fn initialize(&self, config: &PluginConfig) -> Result<()> {
        let signer = config
            .settings
            .get("signer")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
        info!(signer = ?signer, "Initialising digest signature plugin");
        if let Ok(mut slot) = self.signer.lock() {
            *slot = signer;
        }
        Ok(())
    }

    fn process(&self, input: &PluginInput) -> Result<PluginOutput> {
        let output = match input.parameter_str("operation").unwrap_or("sign") {
            "sign" => self.sign(input),
            "verify" => self.verify(input),
            other => PluginOutput::failure(format!("unsupported signature operation: {other}")),
        };
        Ok(output)
    }

    fn cleanup(&self) -> Result<()> {
        if let Ok(mut slot) = self.signer.lock() {
            *slot = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SHA-256("hello"), verified against coreutils sha256sum.
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn plugin_with_signer(signer: &str) -> DigestSignaturePlugin {
        let plugin = DigestSignaturePlugin::new();
        let config = PluginConfig::default().with_setting("signer", json!(signer));
        plugin.initialize(&config).expect("initialize");
        plugin
    }

    #[test]
    fn sign_returns_detached_digest() {
        let plugin = plugin_with_signer("legal@example.org");
        let out = plugin
            .process(&PluginInput::new(b"hello".to_vec(), "application/pdf"))
            .expect("process");
        assert!(out.success);
        assert_eq!(out.data, b"hello");
        assert_eq!(out.metadata["digest"], json!(HELLO_SHA256));
        assert_eq!(out.metadata["signer"], json!("legal@example.org"));
    }

    #[test]
    fn signature_digest_matches_the_metadata_fingerprint() {
        let plugin = plugin_with_signer("x");
        let out = plugin
            .process(&PluginInput::new(b"hello".to_vec(), "text/plain"))
            .expect("process");
        assert_eq!(out.metadata["digest"], json!(fingerprint(b"hello")));
        assert_eq!(fingerprint(b"hello"), HELLO_SHA256);
    }

    #[test]
    fn verify_detects_tampering() {
        let plugin = plugin_with_signer("x");
        let ok = plugin
            .process(
                &PluginInput::new(b"hello".to_vec(), "text/plain")
                    .with_parameter("operation", json!("verify"))
                    .with_parameter("digest", json!(HELLO_SHA256.to_uppercase())),
            )
            .expect("verify");
        assert!(ok.success);

        let tampered = plugin
            .process(
                &PluginInput::new(b"hellO".to_vec(), "text/plain")
                    .with_parameter("operation", json!("verify"))
                    .with_parameter("digest", json!(HELLO_SHA256)),
            )
            .expect("verify");
        assert!(!tampered.success);
        assert_eq!(tampered.metadata["verified"], json!(false));
    }

    #[test]
    fn unknown_operation_is_a_failure_result() {
        let out = DigestSignaturePlugin::new()
            .process(&PluginInput::default().with_parameter("operation", json!("notarise")))
            .expect("process");
        assert!(!out.success);
    }
}
