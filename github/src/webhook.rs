use super::{Event, EventType};
use log::{debug, warn};

/// The GitHub header key used to pass the event type
///
/// GitHub API docs: https://docs.github.com/en/webhooks/webhook-events-and-payloads#delivery-headers
pub const EVENT_TYPE_HEADER: &str = "X-GitHub-Event";

/// The GitHub header key used to pass the unique ID for the webhook event
pub const DELIVERY_ID_HEADER: &str = "X-GitHub-Delivery";

/// The GitHub header key used to pass the HMAC-SHA256 hexdigest
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

#[derive(Clone, Debug)]
pub struct Webhook {
    pub event_type: EventType,
    pub delivery_id: String,
    pub signature: Option<String>,
    pub body: Vec<u8>,
}

impl Webhook {
    /// Verify the payload signature against a shared secret.
    ///
    /// The signature header carries `sha256=<hex>` where `<hex>` is the
    /// HMAC-SHA256 of the raw request body under the webhook secret.
    pub fn check_signature(&self, key: Option<&[u8]>) -> bool {
        match (key, &self.signature) {
            (Some(key), Some(signature)) if signature.starts_with("sha256=") => {
                let hash = hex::encode(hmac_sha256::HMAC::mac(&self.body, key));
                let signature = &signature["sha256=".len()..];

                debug!("hash: {}", hash);
                debug!("sig:  {}", signature);
                hash == signature
            }
            // We are expecting a signature and we either received it in a
            // different format than expected or no signature was sent.
            (Some(_), _) => false,
            // No key or signature to check
            (None, _) => {
                warn!("No secret specified; signature ignored");
                true
            }
        }
    }

    /// Hex HMAC-SHA256 digest of `message` under `key`, in the format GitHub
    /// puts after the `sha256=` prefix.
    pub fn sign(key: &[u8], message: &[u8]) -> String {
        hex::encode(hmac_sha256::HMAC::mac(message, key))
    }

    pub fn to_event(&self) -> Result<Event, serde_json::Error> {
        Event::from_json(self.event_type, &self.body)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn webhook(signature: Option<&str>, body: &[u8]) -> Webhook {
        Webhook {
            event_type: EventType::Ping,
            delivery_id: "d-1".to_owned(),
            signature: signature.map(str::to_owned),
            body: body.to_vec(),
        }
    }

    #[test]
    fn sign_then_verify() {
        let secret = b"super-secret";
        let body = br#"{"zen":"Design for failure.","hook_id":1}"#;

        let signature = format!("sha256={}", Webhook::sign(secret, body));
        assert!(webhook(Some(&signature), body).check_signature(Some(secret)));
    }

    #[test]
    fn bad_signature_is_rejected() {
        let secret = b"super-secret";
        let body = br#"{"zen":"Keep it logically awesome."}"#;

        let signature = format!("sha256={}", Webhook::sign(b"other-secret", body));
        assert!(!webhook(Some(&signature), body).check_signature(Some(secret)));
    }

    #[test]
    fn wrong_format_is_rejected() {
        let secret = b"super-secret";
        let body = b"{}";

        // sha1 signatures are not accepted anymore
        assert!(!webhook(Some("sha1=abcdef"), body).check_signature(Some(secret)));
        assert!(!webhook(None, body).check_signature(Some(secret)));
    }

    #[test]
    fn missing_secret_skips_verification() {
        assert!(webhook(None, b"{}").check_signature(None));
    }
}
