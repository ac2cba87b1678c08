use lazy_static::lazy_static;
use regex::Regex;
use sqlx::SqlitePool;
use tracing::{info, warn};
use validator::Validate;

use crate::{
    error::{is_unique_violation, ApiError, FieldErrors},
    users::{
        dto::{RegisterRequest, TokenRequest, UpdateProfileRequest},
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo_types::{NewUser, ProfileChanges, User},
    },
};

const BLANK: &str = "This field may not be blank.";
const EMAIL_TAKEN: &str = "user with this email already exists.";
const BAD_CREDENTIALS: &str = "Unable to authenticate with provided credentials.";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Creates a regular user. Rejects an empty email and stores only the password hash.
pub async fn create_user(
    db: &SqlitePool,
    email: &str,
    password: &str,
    name: &str,
) -> Result<User, ApiError> {
    create_account(db, email, password, name, false).await
}

/// Creates a user with the staff and superuser flags set.
pub async fn create_superuser(
    db: &SqlitePool,
    email: &str,
    password: &str,
) -> Result<User, ApiError> {
    create_account(db, email, password, "", true).await
}

async fn create_account(
    db: &SqlitePool,
    email: &str,
    password: &str,
    name: &str,
    superuser: bool,
) -> Result<User, ApiError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(ApiError::field("email", "Users must have an email address."));
    }

    let password_hash = hash_password(password)?;
    let new = NewUser {
        email: &email,
        password_hash: &password_hash,
        name,
        is_staff: superuser,
        is_superuser: superuser,
    };

    match User::create(db, &new).await {
        Ok(user) => Ok(user),
        Err(e) if is_unique_violation(&e) => Err(ApiError::field("email", EMAIL_TAKEN)),
        Err(e) => Err(e.into()),
    }
}

/// Adds an error under `email` when it is blank, malformed, or held by another user.
async fn check_email(
    db: &SqlitePool,
    email: &str,
    except_id: Option<i64>,
    errors: &mut FieldErrors,
) -> Result<(), ApiError> {
    if email.is_empty() {
        errors.add("email", BLANK);
    } else if !is_valid_email(email) {
        errors.add("email", "Enter a valid email address.");
    } else if User::email_taken(db, email, except_id).await? {
        errors.add("email", EMAIL_TAKEN);
    }
    Ok(())
}

pub async fn register(db: &SqlitePool, payload: RegisterRequest) -> Result<User, ApiError> {
    let mut errors = FieldErrors::new();
    if let Err(e) = payload.validate() {
        errors.extend(e.into());
    }
    let email = normalize_email(&payload.email);
    check_email(db, &email, None, &mut errors).await?;
    if !errors.is_empty() {
        warn!(fields = ?errors, "registration rejected");
    }
    errors.into_result()?;

    let user = create_user(db, &email, &payload.password, payload.name.trim()).await?;
    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(user)
}

/// Checks credentials and returns a signed bearer token.
pub async fn issue_token(
    db: &SqlitePool,
    keys: &JwtKeys,
    payload: TokenRequest,
) -> Result<String, ApiError> {
    let email = normalize_email(&payload.email);
    let mut errors = FieldErrors::new();
    if email.is_empty() {
        errors.add("email", BLANK);
    }
    if payload.password.is_empty() {
        errors.add("password", BLANK);
    }
    errors.into_result()?;

    let Some(user) = User::find_by_email(db, &email).await? else {
        warn!(email = %email, "token requested for unknown email");
        return Err(ApiError::non_field(BAD_CREDENTIALS));
    };

    if !user.is_active || !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = user.id, "token requested with invalid credentials");
        return Err(ApiError::non_field(BAD_CREDENTIALS));
    }

    let token = keys.sign(user.id)?;
    info!(user_id = user.id, "token issued");
    Ok(token)
}

/// Applies the supplied fields to the caller's profile, re-hashing a new password.
pub async fn update_profile(
    db: &SqlitePool,
    caller: &User,
    payload: UpdateProfileRequest,
) -> Result<User, ApiError> {
    let mut errors = FieldErrors::new();
    if let Err(e) = payload.validate() {
        errors.extend(e.into());
    }
    let email = payload.email.as_deref().map(normalize_email);
    if let Some(email) = &email {
        check_email(db, email, Some(caller.id), &mut errors).await?;
    }
    errors.into_result()?;

    let changes = ProfileChanges {
        email,
        name: payload.name.map(|n| n.trim().to_string()),
        password_hash: payload.password.as_deref().map(hash_password).transpose()?,
    };

    let user = match User::update_profile(db, caller.id, &changes).await {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => return Err(ApiError::field("email", EMAIL_TAKEN)),
        Err(e) => return Err(e.into()),
    };
    info!(
        user_id = user.id,
        password_changed = changes.password_hash.is_some(),
        "profile updated"
    );
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_pool;

    #[test]
    fn email_regex() {
        assert!(is_valid_email("test@ryszyydev.com"));
        assert!(!is_valid_email("one"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("user@nodot"));
    }

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Test@RyszyyDev.COM "), "test@ryszyydev.com");
    }

    #[tokio::test]
    async fn create_user_hashes_password() {
        let db = test_pool().await;
        let user = create_user(&db, "Test@Example.com", "test123", "Test name")
            .await
            .unwrap();
        assert_eq!(user.email, "test@example.com");
        assert_ne!(user.password_hash, "test123");
        assert!(verify_password("test123", &user.password_hash).unwrap());
        assert!(user.is_active);
        assert!(!user.is_staff);
        assert!(!user.is_superuser);
    }

    #[tokio::test]
    async fn create_user_rejects_empty_email() {
        let db = test_pool().await;
        let err = create_user(&db, "   ", "test123", "").await.unwrap_err();
        match err {
            ApiError::Validation(fields) => assert!(fields.contains("email")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_superuser_sets_flags() {
        let db = test_pool().await;
        let user = create_superuser(&db, "admin@example.com", "test123")
            .await
            .unwrap();
        assert!(user.is_staff);
        assert!(user.is_superuser);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_validation_error() {
        let db = test_pool().await;
        create_user(&db, "dup@example.com", "test123", "").await.unwrap();
        let err = create_user(&db, "DUP@example.com", "test123", "")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
