/// API route handlers, one module per resource
///
/// - `health`: Health check endpoint
/// - `webhook`: Stripe webhook receiver
/// - `auth`: Registration, login and token refresh
/// - `profile`: Profile and preferences
/// - `billing`: Checkout, cancellation and subscription status
/// - `admin`: Immediate subscription cancellation
/// - `family`: Family sharing
/// - `referrals`: Referral invitations and stats
/// - `stories`: Emotion stories, moments, comments and reactions
/// - `mood_tags`: Custom mood tags

use serde::{Deserialize, Deserializer};

pub mod admin;
pub mod auth;
pub mod billing;
pub mod family;
pub mod health;
pub mod mood_tags;
pub mod profile;
pub mod referrals;
pub mod stories;
pub mod webhook;

/// Distinguishes a missing field (`None`) from an explicit null (`Some(None)`)
///
/// Use with `#[serde(default, deserialize_with = "double_option")]`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
