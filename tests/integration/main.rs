//! End-to-end tests of the analysis pipeline against mock providers.

mod analysis;
mod mock_providers;
