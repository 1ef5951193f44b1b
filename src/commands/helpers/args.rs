use chrono::NaiveDate;

pub(crate) fn parse_site_arg(raw: &str) -> Result<&str, String> {
    let mut tokens = raw.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(site_id), None) => Ok(site_id),
        (None, _) => Err("site id is required".to_string()),
        (Some(_), Some(_)) => Err("expected a single site id".to_string()),
    }
}

/// `<site> [YYYY-MM-DD|today|yesterday]`, defaulting to `today`.
pub(crate) fn parse_timeline_args(raw: &str, today: NaiveDate) -> Result<(&str, NaiveDate), String> {
    let mut tokens = raw.split_whitespace();
    let site_id = tokens.next().ok_or_else(|| "site id is required".to_string())?;

    let day = match tokens.next() {
        None | Some("today") => today,
        Some("yesterday") => today
            .pred_opt()
            .ok_or_else(|| "date is out of range".to_string())?,
        Some(raw_day) => NaiveDate::parse_from_str(raw_day, "%Y-%m-%d")
            .map_err(|_| format!("invalid date '{}' (expected YYYY-MM-DD)", raw_day))?,
    };

    if tokens.next().is_some() {
        return Err("too many arguments".to_string());
    }
    if day > today {
        return Err("date is in the future".to_string());
    }

    Ok((site_id, day))
}

pub(crate) fn parse_delete_args(raw: &str) -> Result<(&str, u64), String> {
    let mut tokens = raw.split_whitespace();
    let (Some(site_id), Some(raw_id), None) = (tokens.next(), tokens.next(), tokens.next()) else {
        return Err("usage: /deleteevent <site> <event_id>".to_string());
    };
    let event_id = raw_id
        .parse::<u64>()
        .map_err(|_| format!("invalid event id '{}'", raw_id))?;
    Ok((site_id, event_id))
}
