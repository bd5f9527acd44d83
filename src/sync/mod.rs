//! Synchronous connection layer.

mod bind_result;
mod char_result;
mod conn;
mod cursor;
mod prepared;
mod transaction;

pub use bind_result::BindResult;
pub use char_result::CharResult;
pub use conn::Connection;
pub use cursor::{RowCursor, Rows};
pub use prepared::PreparedStatement;
pub use transaction::Transaction;
