mod handlers;
mod server;
#[cfg(test)]
mod tests;

pub use handlers::{ApiError, StatusUpdateRequest};
pub use server::{AdminServer, AdminState};
