//! HTTP-Redirect Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-Redirect binding for sending SAML messages
//! via URL query parameters with DEFLATE compression. The signature covers
//! `SAMLRequest=…[&RelayState=…]&SigAlg=…` exactly as the parameters appear
//! in the URL, so verification works from the raw query string.

use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{SamlError, SamlResult};
use crate::signature::{SignatureEngine, SigningPayload};
use crate::xml::MAX_MESSAGE_SIZE;

use super::{DecodedMessage, SamlMessageType};

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Encodes an unsigned message.
    ///
    /// Returns the destination URL with the message in its query string.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Deflate`] if compression fails.
    pub fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> SamlResult<String> {
        let query = Self::query(xml, relay_state, message_type)?;
        Ok(join_query(destination, &query))
    }

    /// Encodes a message and signs the query string.
    ///
    /// The key and algorithm are the ones `engine` uses for `partner`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Deflate`] or [`SamlError::SignatureCreation`].
    pub fn encode_signed(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
        engine: &SignatureEngine,
        partner: Option<&str>,
    ) -> SamlResult<String> {
        let algorithm = engine.algorithm_for(partner);
        let mut query = Self::query(xml, relay_state, message_type)?;
        query.push_str(&format!("&SigAlg={}", urlencoding::encode(algorithm.uri())));

        let payload = SigningPayload::raw(message_type.message_kind(), query.as_bytes());
        let signature = SignatureEngine::sign(&payload, engine.key_for(partner), algorithm)?;
        query.push_str(&format!(
            "&Signature={}",
            urlencoding::encode(&signature.to_base64())
        ));
        Ok(join_query(destination, &query))
    }

    fn query(
        xml: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> SamlResult<String> {
        let compressed = deflate_compress(xml.as_bytes())?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(compressed);

        let mut query = format!(
            "{}={}",
            message_type.form_param(),
            urlencoding::encode(&encoded)
        );
        if let Some(rs) = relay_state {
            query.push_str(&format!("&RelayState={}", urlencoding::encode(rs)));
        }
        Ok(query)
    }

    /// Decodes a message from the raw (still URL-encoded) query string.
    ///
    /// The signed octets are rebuilt from the raw parameter values, so a
    /// signature stays verifiable whatever encoding the sender chose.
    ///
    /// # Errors
    ///
    /// Returns an error if no message parameter is present or the message
    /// cannot be decoded.
    pub fn decode_query(raw_query: &str) -> SamlResult<DecodedMessage> {
        let mut message: Option<(SamlMessageType, &str)> = None;
        let mut relay_state = None;
        let mut sig_alg = None;
        let mut signature = None;

        for pair in raw_query.split('&').filter(|p| !p.is_empty()) {
            let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "SAMLRequest" => message = Some((SamlMessageType::Request, raw)),
                "SAMLResponse" => message = Some((SamlMessageType::Response, raw)),
                "RelayState" => relay_state = Some(raw),
                "SigAlg" => sig_alg = Some(raw),
                "Signature" => signature = Some(raw),
                _ => {}
            }
        }

        let Some((message_type, raw_message)) = message else {
            return Err(SamlError::InvalidRequest(
                "No SAMLRequest or SAMLResponse parameter".to_string(),
            ));
        };

        let signed_octets = sig_alg.map(|alg| {
            let mut octets = format!("{}={raw_message}", message_type.form_param());
            if let Some(rs) = relay_state {
                octets.push_str(&format!("&RelayState={rs}"));
            }
            octets.push_str(&format!("&SigAlg={alg}"));
            octets
        });

        let xml = inflate_message(&form_decode(raw_message))?;
        Ok(DecodedMessage {
            xml,
            message_type,
            relay_state: relay_state.map(form_decode),
            signature: signature.map(form_decode),
            sig_alg: sig_alg.map(form_decode),
            signed_octets,
        })
    }

    /// Decodes a message from a full URL.
    ///
    /// # Errors
    ///
    /// See [`HttpRedirectBinding::decode_query`].
    pub fn decode_url(url: &str) -> SamlResult<DecodedMessage> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SamlError::InvalidRequest(format!("Invalid URL: {e}")))?;
        Self::decode_query(parsed.query().unwrap_or_default())
    }
}

fn join_query(destination: &str, query: &str) -> String {
    let separator = if destination.contains('?') { '&' } else { '?' };
    format!("{destination}{separator}{query}")
}

fn form_decode(raw: &str) -> String {
    url::form_urlencoded::parse(format!("v={raw}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

fn inflate_message(encoded: &str) -> SamlResult<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let compressed = base64::engine::general_purpose::STANDARD.decode(compact)?;
    let xml_bytes = deflate_decompress(&compressed)?;
    String::from_utf8(xml_bytes)
        .map_err(|e| SamlError::InvalidRequest(format!("Invalid UTF-8 in message: {e}")))
}

/// Compresses data using DEFLATE (raw, no zlib header).
fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Deflate(format!("Compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Deflate(format!("Compression finish error: {e}")))
}

/// Decompresses DEFLATE data, refusing output above the message size limit.
fn deflate_decompress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data).take(MAX_MESSAGE_SIZE as u64 + 1);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| SamlError::Deflate(format!("Decompression error: {e}")))?;
    if decompressed.len() > MAX_MESSAGE_SIZE {
        return Err(SamlError::Deflate("message too large".to_string()));
    }
    Ok(decompressed)
}
