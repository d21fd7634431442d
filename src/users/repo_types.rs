use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: i64,                             // assigned by storage
    pub username: String,                    // unique among live rows
    pub password_hash: String,               // Argon2 hash, never exposed
    pub email: String,                       // unique among live rows
    pub first_name: String,
    pub last_name: String,
    pub profile_image: Option<String>,       // base64 payload
    pub version: i64,                        // optimistic concurrency token
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,  // soft delete marker
}

/// Fields supplied on insert; storage fills in the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_image: Option<String>,
}

/// Equality filter for searches. Absent or empty fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserCondition {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserCondition {
    /// Populated `(column, value)` pairs, in a fixed column order.
    pub fn populated(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("username", self.username.as_deref()),
            ("email", self.email.as_deref()),
            ("first_name", self.first_name.as_deref()),
            ("last_name", self.last_name.as_deref()),
        ]
        .into_iter()
        .filter_map(|(column, value)| match value {
            Some(v) if !v.is_empty() => Some((column, v)),
            _ => None,
        })
    }

    pub fn matches(&self, user: &User) -> bool {
        self.populated().all(|(column, value)| {
            let field = match column {
                "username" => &user.username,
                "email" => &user.email,
                "first_name" => &user.first_name,
                _ => &user.last_name,
            };
            field == value
        })
    }
}
