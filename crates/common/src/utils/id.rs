use uuid::Uuid;

/// Generate the identifier an agent process presents on every handshake
pub fn generate_client_instance_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_client_instance_id_is_v4() {
        let id = generate_client_instance_id();

        assert_eq!(id.len(), 36);
        let uuid = Uuid::parse_str(&id).unwrap();
        assert_eq!(uuid.get_version_num(), 4);
    }

    #[test]
    fn test_client_instance_id_uniqueness() {
        let ids: HashSet<_> = (0..1000).map(|_| generate_client_instance_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
