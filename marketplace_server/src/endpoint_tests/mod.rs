mod auth;
mod health;
mod helpers;
mod mocks;
mod rate_limit;
mod shipping;
mod webhook;
