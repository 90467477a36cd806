// src/auth.rs
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::{Role, User};
use crate::{AppError, AppState};

// --- 1. 密码处理 (Argon2) ---

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(password_hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

// --- 2. JWT 处理 ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i32, // 用户 ID
    pub email: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize, // 过期时间
}

/// 签发与校验令牌; 密钥与有效期来自配置
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp() as usize,
            exp: (now + self.ttl).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("JWT verification failed: {}", e);
                AppError::Unauthorized("Invalid or expired token".into())
            })
    }
}

// --- 3. 请求会话 (AuthUser Extractor) ---
// Handler 中通过 (user: AuthUser) 获取当前登录用户

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub teacher_id: Option<i32>,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i32,
    email: String,
    name: String,
    role: Role,
    is_active: bool,
    teacher_id: Option<i32>,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // 1. 从 HTTP Header 提取 Bearer Token
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized("No token provided".into()))?;

        // 2. 验证 Token 有效性
        let claims = state.jwt.verify(bearer.token())?;

        // 3. 重新加载用户与教师档案, 停用账号视为未认证
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT u.id, u.email, u.name, u.role, u.is_active, t.id AS teacher_id
             FROM users u
             LEFT JOIN teachers t ON t.user_id = u.id
             WHERE u.id = $1",
        )
        .bind(claims.sub)
        .fetch_optional(&state.db)
        .await?;

        match row {
            Some(row) if row.is_active => Ok(AuthUser {
                id: row.id,
                email: row.email,
                name: row.name,
                role: row.role,
                teacher_id: row.teacher_id,
            }),
            _ => Err(AppError::Unauthorized("User not found or inactive".into())),
        }
    }
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self, action: &str) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("Only admins can {}", action)))
        }
    }

    pub fn require_any(&self, roles: &[Role], message: &str) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(message.to_string()))
        }
    }

    /// 要求教师角色且存在教师档案, 返回教师 ID
    pub fn require_teacher(&self, action: &str) -> Result<i32, AppError> {
        if self.role != Role::Teacher {
            return Err(AppError::Forbidden(format!("Only teachers can {}", action)));
        }
        self.teacher_id
            .ok_or_else(|| AppError::NotFound("Teacher profile not found".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User {
            id: 7,
            email: "teacher1@school.com".into(),
            password_hash: String::new(),
            name: "John Smith".into(),
            role,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn session(role: Role, teacher_id: Option<i32>) -> AuthUser {
        AuthUser {
            id: 1,
            email: "someone@school.com".into(),
            name: "Someone".into(),
            role,
            teacher_id,
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("password123").unwrap();
        assert!(verify_password("password123", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("password123", "not-a-phc-string"));
    }

    #[test]
    fn issued_token_carries_identity_and_role() {
        let keys = JwtKeys::new("test-secret", 1);
        let token = keys.issue(&user(Role::Teacher)).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.role, Role::Teacher);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = JwtKeys::new("secret-a", 1).issue(&user(Role::Admin)).unwrap();
        let err = JwtKeys::new("secret-b", 1).verify(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = JwtKeys::new("test-secret", -2);
        let token = keys.issue(&user(Role::Admin)).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn role_guards() {
        let admin = session(Role::Admin, None);
        assert!(admin.require_admin("create classes").is_ok());
        assert!(matches!(admin.require_teacher("mark attendance"), Err(AppError::Forbidden(_))));

        let teacher = session(Role::Teacher, Some(3));
        assert!(matches!(teacher.require_admin("create classes"), Err(AppError::Forbidden(m)) if m == "Only admins can create classes"));
        assert_eq!(teacher.require_teacher("mark attendance").unwrap(), 3);
        assert!(teacher.require_any(&[Role::Admin, Role::Teacher], "nope").is_ok());

        let orphan = session(Role::Teacher, None);
        assert!(matches!(orphan.require_teacher("mark attendance"), Err(AppError::NotFound(_))));
    }
}
