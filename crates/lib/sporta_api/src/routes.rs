//! Route paths, all under `/api/v1`.

pub const POST_AUTH_REGISTRATION: &str = "/api/v1/auth/registration";
pub const POST_AUTH_LOGIN: &str = "/api/v1/auth/login";
pub const POST_AUTH_REFRESH: &str = "/api/v1/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/api/v1/auth/logout";
pub const POST_AUTH_OTP_SEND: &str = "/api/v1/auth/otp/send";
pub const POST_AUTH_OTP_CONFIRM: &str = "/api/v1/auth/otp/confirm";

pub const GET_USERS_ME: &str = "/api/v1/users/me";
pub const DELETE_USERS_ME: &str = "/api/v1/users/me";

pub const POST_ADMIN_USER_SESSIONS_REVOKE: &str = "/api/v1/admin/users/{user_id}/sessions/revoke";
