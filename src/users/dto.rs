use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::users::repo_types::{User, UserCondition};
use crate::users::services::{CreateUser, UpdateUser};
use crate::users::validator::{
    is_base64, is_valid_email, is_valid_name, is_valid_password, is_valid_username,
};

/// Request body for user creation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub profile_image: String,
}

impl CreateUserRequest {
    pub fn is_valid(&self) -> bool {
        is_valid_username(&self.username)
            && is_valid_password(&self.password)
            && is_valid_email(&self.email)
            && !self.first_name.is_empty()
            && is_valid_name(&self.first_name)
            && !self.last_name.is_empty()
            && is_valid_name(&self.last_name)
            && is_base64(&self.profile_image)
    }
}

impl From<CreateUserRequest> for CreateUser {
    fn from(r: CreateUserRequest) -> Self {
        Self {
            username: r.username,
            password: r.password,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            profile_image: r.profile_image,
        }
    }
}

/// Request body for a partial update. Empty fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub profile_image: String,
    pub version: i64,
}

impl UpdateUserRequest {
    pub fn is_valid(&self) -> bool {
        (self.username.is_empty() || is_valid_username(&self.username))
            && (self.email.is_empty() || is_valid_email(&self.email))
            && is_valid_name(&self.first_name)
            && is_valid_name(&self.last_name)
            && is_base64(&self.profile_image)
            && self.version >= 0
    }

    pub fn into_parts(self) -> (i64, UpdateUser) {
        let changes = UpdateUser {
            username: Some(self.username),
            email: Some(self.email),
            first_name: Some(self.first_name),
            last_name: Some(self.last_name),
            profile_image: Some(self.profile_image),
        };
        (self.version, changes)
    }
}

/// Request body for a password change.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub username: String,
    pub password: String,
}

impl ChangePasswordRequest {
    pub fn is_valid(&self) -> bool {
        !self.username.is_empty() && is_valid_password(&self.password)
    }
}

/// Query string of `DELETE /users/:id`.
#[derive(Debug, Deserialize)]
pub struct DeleteUserQuery {
    pub version: i64,
}

impl DeleteUserQuery {
    pub fn is_valid(&self) -> bool {
        self.version >= 0
    }
}

/// Query string of `GET /users/search`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchUserQuery {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<SearchUserQuery> for UserCondition {
    fn from(q: SearchUserQuery) -> Self {
        Self {
            username: q.username,
            email: q.email,
            first_name: q.first_name,
            last_name: q.last_name,
        }
    }
}

/// Public part of the user returned to the client. Never carries the hash.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_image: Option<String>,
    pub version: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            profile_image: u.profile_image,
            version: u.version,
            created_at: u.created_at,
            updated_at: u.updated_at,
            deleted_at: u.deleted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn create_request() -> CreateUserRequest {
        serde_json::from_value(serde_json::json!({
            "username": "alice",
            "password": "Abcdefg1!",
            "email": "a@x.com",
            "firstName": "A",
            "lastName": "L"
        }))
        .unwrap()
    }

    #[test]
    fn create_request_validation() {
        assert!(create_request().is_valid());

        let mut weak = create_request();
        weak.password = "abcdefg1!".into();
        assert!(!weak.is_valid());

        let mut image = create_request();
        image.profile_image = "%%%".into();
        assert!(!image.is_valid());

        let mut nameless = create_request();
        nameless.first_name.clear();
        assert!(!nameless.is_valid());
    }

    #[test]
    fn update_request_allows_empty_fields() {
        let req: UpdateUserRequest =
            serde_json::from_value(serde_json::json!({ "email": "b@x.com", "version": 0 }))
                .unwrap();
        assert!(req.is_valid());

        let (version, changes) = req.into_parts();
        assert_eq!(version, 0);
        assert_eq!(changes.email.as_deref(), Some("b@x.com"));
        assert_eq!(changes.username.as_deref(), Some(""));
    }

    #[test]
    fn update_request_requires_version() {
        let parsed = serde_json::from_value::<UpdateUserRequest>(
            serde_json::json!({ "email": "b@x.com" }),
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn delete_query_rejects_negative_version() {
        assert!(DeleteUserQuery { version: 0 }.is_valid());
        assert!(DeleteUserQuery { version: 7 }.is_valid());
        assert!(!DeleteUserQuery { version: -1 }.is_valid());
    }

    #[test]
    fn response_omits_password_hash() {
        let user = User {
            id: 1,
            username: "alice".into(),
            password_hash: "$argon2id$secret".into(),
            email: "a@x.com".into(),
            first_name: "A".into(),
            last_name: "L".into(),
            profile_image: None,
            version: 2,
            created_at: datetime!(2024-01-01 0:00 UTC),
            updated_at: datetime!(2024-01-02 0:00 UTC),
            deleted_at: None,
        };

        let json = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert!(!json.to_string().contains("argon2"));
        assert_eq!(json["version"], 2);
        assert_eq!(json["created_at"], "2024-01-01T00:00:00Z");
        assert!(json["deleted_at"].is_null());
    }
}
