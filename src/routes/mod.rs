mod auth;
mod health_check;

pub use auth::{
    current_user, login, logout, logout_all, refresh, register, ApiResponse, CurrentUser,
    LoginRequest, LoginResult, RefreshRequest, RegisterRequest,
};
pub use health_check::health_check;
