//! Low-level stream establishment

mod codec;
mod stream;

pub use codec::{Packet, XmppCodec};
pub use stream::XmppStream;
