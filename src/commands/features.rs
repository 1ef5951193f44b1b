pub(crate) mod admin;
pub(crate) mod health;
pub(crate) mod sites;
pub(crate) mod timeline;
