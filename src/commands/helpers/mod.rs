mod args;
mod auth;
mod formatting;

pub(super) use args::{parse_delete_args, parse_site_arg, parse_timeline_args};
pub(super) use auth::is_authorized;
pub(super) use formatting::{as_html_block, format_instant, send_html};
