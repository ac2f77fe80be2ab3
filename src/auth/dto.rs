use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Response returned after registration: the created user together with
/// the token issued for it.
#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub username: String,
    pub token: String,
}

/// Response returned after login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_user_never_echoes_password_material() {
        let response = RegisteredUser {
            id: Uuid::new_v4(),
            username: "batman".into(),
            token: "jwt".into(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("batman"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn auth_response_shape() {
        let response = AuthResponse {
            token: "jwt".into(),
            user: PublicUser {
                id: Uuid::new_v4(),
                username: "star_lord".into(),
            },
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"token\""));
        assert!(json.contains("star_lord"));
        assert!(!json.contains("password"));
    }
}
