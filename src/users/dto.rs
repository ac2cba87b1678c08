use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::users::repo_types::User;

/// Request body for `POST /user/create`.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 5, message = "Ensure this field has at least 5 characters."))]
    pub password: String,
    #[serde(default)]
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub name: String,
}

/// Request body for `POST /user/token`.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Request body for `PATCH /user/me`; absent fields are left alone.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    #[validate(length(min = 5, message = "Ensure this field has at least 5 characters."))]
    pub password: Option<String>,
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ProfileResponse {
    pub email: String,
    pub name: String,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            email: user.email,
            name: user.name,
        }
    }
}
