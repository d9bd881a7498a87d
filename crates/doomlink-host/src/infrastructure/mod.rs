//! Infrastructure layer: the OS-facing pieces of the host.
//!
//! # Sub-modules
//!
//! - **`transport`** – Unix-domain listener and the single connected client:
//!   non-blocking receive into a ring buffer, blocking send with retry,
//!   orderly close.
//!
//! - **`shm`** – POSIX shared-memory object that frames are copied into when
//!   the client asks for the fast path.
//!
//! - **`signal`** – The cancellation token that SIGINT/SIGTERM set.

pub mod shm;
pub mod signal;
pub mod transport;
