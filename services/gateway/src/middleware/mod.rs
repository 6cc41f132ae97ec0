//! Policy middleware applied ahead of the proxy engine.
//!
//! Stateless except for the rate limiter's window counters. Rejections
//! here never reach the route table or an upstream.

pub mod cors;
pub mod rate_limit;
