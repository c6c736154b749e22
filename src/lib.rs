//! IRC gateway for a browser-mediated messaging service.
//!
//! Each IRC client connection is paired with one messaging-service session;
//! group chats become channels and direct chats become private queries.

pub mod bridge;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod irc;
pub mod maps;
pub mod storage;
pub mod upstream;
pub mod web;
