use rand::RngCore;

/// Generate an opaque credential for a freshly shared resource.
///
/// The core never interprets this value; it only stores and forwards it to
/// the bulk-transfer collaborator via [`crate::resource::SharedResource::ftp_password`].
/// Never logged.
pub fn generate_credential() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_32_hex_chars() {
        let cred = generate_credential();
        assert_eq!(cred.len(), 32);
        assert!(cred.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn is_not_deterministic() {
        assert_ne!(generate_credential(), generate_credential());
    }
}
