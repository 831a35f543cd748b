//! Name validation for values that end up in zone files, the Corefile and
//! store keys. Everything here runs before any storage is touched.

/// Maximum length of a domain name in presentation form (without trailing dot)
pub const MAX_DOMAIN_LENGTH: usize = 253;

/// Maximum length of a single label
pub const MAX_LABEL_LENGTH: usize = 63;

/// Largest TTL or SOA timer value (RFC 2181, section 8)
pub const MAX_TTL: u32 = i32::MAX as u32;

/// Name validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyName,
    DomainNameTooLong(usize),
    LabelTooLong(usize),
    InvalidLabelCharacters(String),
    InvalidLabelFormat(String),
    ValueTooLarge { field: String, value: u32 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyName => write!(f, "Name cannot be empty"),
            ValidationError::DomainNameTooLong(len) => {
                write!(f, "Domain name too long: {} bytes", len)
            }
            ValidationError::LabelTooLong(len) => write!(f, "DNS label too long: {} bytes", len),
            ValidationError::InvalidLabelCharacters(label) => {
                write!(f, "Invalid characters in label: {}", label)
            }
            ValidationError::InvalidLabelFormat(label) => {
                write!(f, "Invalid label format: {}", label)
            }
            ValidationError::ValueTooLarge { field, value } => {
                write!(f, "{} {} exceeds the maximum of {}", field, value, MAX_TTL)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a zone name and return its canonical form: lowercase, without the
/// trailing dot. Zone names become file names, so only RFC 1123 labels pass.
pub fn normalize_zone_name(name: &str) -> Result<String, ValidationError> {
    let name = canonical(name)?;
    for label in name.split('.') {
        validate_label(label, false)?;
    }
    Ok(name)
}

/// Validate a host name for an address record.
///
/// Accepts `@` for the zone apex, a leading `*` wildcard label and labels
/// starting with `_` (service labels). Returned lowercase, without trailing dot.
pub fn normalize_host_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed == "@" {
        return Ok("@".to_string());
    }

    let name = canonical(trimmed)?;
    for (i, label) in name.split('.').enumerate() {
        if i == 0 && label == "*" {
            continue;
        }
        validate_label(label, true)?;
    }
    Ok(name)
}

/// Validate a name carried inside the SOA record (mname, rname)
pub fn normalize_domain_name(name: &str) -> Result<String, ValidationError> {
    normalize_zone_name(name)
}

/// Validate the responsible-party name of an SOA record. The mailbox form
/// `user@example.com` is stored the way SOA records spell it.
pub fn normalize_rname(name: &str) -> Result<String, ValidationError> {
    normalize_domain_name(&name.replacen('@', ".", 1))
}

/// Reject TTLs and SOA timers outside the 31-bit range
pub fn check_ttl(field: &str, value: u32) -> Result<u32, ValidationError> {
    if value > MAX_TTL {
        return Err(ValidationError::ValueTooLarge {
            field: field.to_string(),
            value,
        });
    }
    Ok(value)
}

fn canonical(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    let name = name.strip_suffix('.').unwrap_or(name);

    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.len() > MAX_DOMAIN_LENGTH {
        return Err(ValidationError::DomainNameTooLong(name.len()));
    }

    Ok(name.to_ascii_lowercase())
}

fn validate_label(label: &str, allow_underscore: bool) -> Result<(), ValidationError> {
    if label.is_empty() {
        return Err(ValidationError::InvalidLabelFormat(label.to_string()));
    }
    if label.len() > MAX_LABEL_LENGTH {
        return Err(ValidationError::LabelTooLong(label.len()));
    }

    let body = match label.strip_prefix('_') {
        Some(rest) if allow_underscore => rest,
        _ => label,
    };

    if body.is_empty() || !body.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidLabelCharacters(label.to_string()));
    }

    // Labels cannot start or end with hyphen
    if body.starts_with('-') || body.ends_with('-') {
        return Err(ValidationError::InvalidLabelFormat(label.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_name_normalization() {
        assert_eq!(normalize_zone_name("Example.COM").unwrap(), "example.com");
        assert_eq!(normalize_zone_name("example.com.").unwrap(), "example.com");
        assert_eq!(normalize_zone_name("sub-a.com").unwrap(), "sub-a.com");
    }

    #[test]
    fn test_zone_name_rejections() {
        assert_eq!(normalize_zone_name(""), Err(ValidationError::EmptyName));
        assert_eq!(normalize_zone_name("."), Err(ValidationError::EmptyName));
        assert!(matches!(
            normalize_zone_name("../etc"),
            Err(ValidationError::InvalidLabelFormat(_))
        ));
        assert!(matches!(
            normalize_zone_name("a/b.com"),
            Err(ValidationError::InvalidLabelCharacters(_))
        ));
        assert!(matches!(
            normalize_zone_name("-bad.com"),
            Err(ValidationError::InvalidLabelFormat(_))
        ));
        assert!(matches!(
            normalize_zone_name("a..com"),
            Err(ValidationError::InvalidLabelFormat(_))
        ));
        assert!(matches!(
            normalize_zone_name("_srv.example.com"),
            Err(ValidationError::InvalidLabelCharacters(_))
        ));

        let long_label = "a".repeat(64);
        assert_eq!(
            normalize_zone_name(&format!("{}.com", long_label)),
            Err(ValidationError::LabelTooLong(64))
        );

        let long_name = vec!["abcdefgh"; 30].join(".");
        assert!(matches!(
            normalize_zone_name(&long_name),
            Err(ValidationError::DomainNameTooLong(_))
        ));
    }

    #[test]
    fn test_host_names() {
        assert_eq!(normalize_host_name("@").unwrap(), "@");
        assert_eq!(normalize_host_name("WEB1").unwrap(), "web1");
        assert_eq!(normalize_host_name("*.example.com").unwrap(), "*.example.com");
        assert_eq!(
            normalize_host_name("_sip._tcp.example.com.").unwrap(),
            "_sip._tcp.example.com"
        );

        assert!(normalize_host_name("web 1").is_err());
        assert!(normalize_host_name("a.*.com").is_err());
        assert!(normalize_host_name("_").is_err());
        assert!(normalize_host_name("web1;rm").is_err());
    }

    #[test]
    fn test_rname_mailbox_form() {
        assert_eq!(
            normalize_rname("Hostmaster@Example.com.").unwrap(),
            "hostmaster.example.com"
        );
        assert_eq!(normalize_rname("admin.netedge.com").unwrap(), "admin.netedge.com");
        assert!(normalize_rname("").is_err());
        assert!(normalize_rname("a@b@c.com").is_err());
    }

    #[test]
    fn test_ttl_bounds() {
        assert_eq!(check_ttl("ttl", MAX_TTL), Ok(MAX_TTL));
        assert_eq!(check_ttl("ttl", 0), Ok(0));
        assert!(matches!(
            check_ttl("ttl", MAX_TTL + 1),
            Err(ValidationError::ValueTooLarge { .. })
        ));
    }
}
