use foundation::{EntityId, TrajectoryPoint};

/// URL of the recorded trajectory of `id` under `base`.
pub fn history_url(base: &str, id: &EntityId) -> String {
    format!("{}/plugins/trajectory/icao24/{}", base.trim_end_matches('/'), id)
}

/// Fetches the already-recorded trajectory of `id`.
pub async fn fetch_history(
    http: &reqwest::Client,
    base: &str,
    id: &EntityId,
) -> Result<Vec<TrajectoryPoint>, reqwest::Error> {
    http.get(history_url(base, id))
        .send()
        .await?
        .error_for_status()?
        .json::<Vec<TrajectoryPoint>>()
        .await
}

#[cfg(test)]
mod tests {
    use super::history_url;
    use foundation::EntityId;

    #[test]
    fn builds_plugin_url() {
        let id = EntityId::parse("4CA7B5").unwrap();
        assert_eq!(
            history_url("http://localhost:5050/", &id),
            "http://localhost:5050/plugins/trajectory/icao24/4ca7b5"
        );
    }
}
