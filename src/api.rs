//! Request/response payload contracts (spec §6). HTTP routing itself is out
//! of scope; these are the shapes a router would bind to.

pub mod dto;
