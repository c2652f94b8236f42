// Authentication module
// Bearer JWT verification for protected routes. Tokens are issued by the
// account service; this API only validates them.

pub mod error;
pub mod middleware;
pub mod token;

pub use error::AuthError;
pub use middleware::{bearer_token, AuthenticatedUser};
pub use token::{Claims, TokenService};
