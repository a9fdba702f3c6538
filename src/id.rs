use uuid::Uuid;

pub fn generate(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_and_uuid_shape() {
        let id = generate("run");
        let (prefix, rest) = id.split_once('_').expect("id has prefix separator");
        assert_eq!(prefix, "run");
        assert!(Uuid::parse_str(rest).is_ok());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(generate("target"), generate("target"));
    }
}
