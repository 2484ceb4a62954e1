pub mod jwt;
pub mod middleware;

pub use jwt::{Claims, JwtError, JwtService};
pub use middleware::{AuthMiddleware, AuthenticatedUser, OwnerId};
