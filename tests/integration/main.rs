//! Integration tests: the full client loop against an in-process
//! lottery server over real TCP.

mod client_loop;
mod mock_server;
