//! PrepPAL - disaster-preparedness backend
//!
//! Citizens keep a go bag checklist, post photos of it for community
//! verification, and earn points through learning modules and quizzes.
//! LGU moderators and super admins handle reports and watch readiness
//! figures for the places they are responsible for.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
