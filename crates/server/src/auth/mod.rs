pub mod grant;
pub mod jwt;
pub mod middleware;
