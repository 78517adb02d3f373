// src/lib.rs
//
// Grocery Rebate Certificates: merchants buy and issue certificates, members
// redeem them month by month against grocery receipts and a survey.

pub mod auth;
pub mod campaign;
pub mod certificate;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod fulfillment;
pub mod grocery;
pub mod lifecycle;
pub mod mailer;
pub mod merchant;
pub mod month;
pub mod ocr;
pub mod pages;
pub mod purchase;
pub mod qualification;
pub mod receipt;
pub mod routes;
pub mod search;
pub mod services;
pub mod store;
pub mod survey;
pub mod user;

pub use error::{Error, Result};
pub use services::Platform;
