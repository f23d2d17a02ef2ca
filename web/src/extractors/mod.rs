pub(crate) mod bearer_credential;
