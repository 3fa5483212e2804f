use uuid::Uuid;

/// Identity of the caller, as asserted by the upstream gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
}

impl AuthContext {
    pub fn from_header(value: &str) -> Result<Self, &'static str> {
        let user_id = Uuid::parse_str(value.trim()).map_err(|_| "Invalid user ID header")?;
        Ok(Self { user_id })
    }
}
