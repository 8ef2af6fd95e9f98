//! The two buffered, order-preserving queues a [`Passer`](crate::passer::Passer) layers over its
//! transport endpoint.

pub(crate) mod recv_queue;
pub(crate) mod send_queue;

pub(crate) use recv_queue::{RecvDrainOutcome, RecvQueue};
pub(crate) use send_queue::{SendDrainOutcome, SendQueue};
