pub mod access;
pub mod userctx;
