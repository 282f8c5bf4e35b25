//! Integration tests. One target, shared mock source.

mod mock_source;
mod orchestration;
mod pipeline;
