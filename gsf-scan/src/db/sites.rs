//! Stored site rows
//!
//! Rows are keyed on `(name, latitude, longitude)`. Upserting an existing key
//! overwrites the analysis fields and keeps the original `stored_at`.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use gsf_common::{
    AnalysisStatus, CapacityEstimate, Coordinates, CoordinatesSource, Error, Result, SiteDetails,
    SiteRecord,
};

use crate::services::export::parse_city_state;
use crate::utils::retry_on_lock;

/// Insert or update `site`, returning the write timestamp
pub async fn upsert_site(
    pool: &SqlitePool,
    site: &SiteRecord,
    max_wait_ms: u64,
) -> Result<DateTime<Utc>> {
    let coordinates = site.coordinates.ok_or_else(|| {
        Error::InvalidInput(format!("Site '{}' has no coordinates", site.name))
    })?;

    let now = Utc::now();
    let now_str = now.to_rfc3339();
    let (city, state) = parse_city_state(&site.address);
    let estimate = site.capacity_estimate;
    let details = site.details.clone().unwrap_or_default();
    // -0.0 and 0.0 must land on the same unique key
    let latitude = coordinates.latitude + 0.0;
    let longitude = coordinates.longitude + 0.0;

    retry_on_lock("upsert_site", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO substations (
                site_id, name, address, latitude, longitude, city, state,
                capacity_mva, capacity_min_mva, capacity_confidence,
                voltage_level, utility_owner, ownership_confidence, ownership_source,
                interconnection_type, substation_type, load_factor, capacity_source,
                status, coordinates_source, stored_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name, latitude, longitude) DO UPDATE SET
                address = excluded.address,
                city = excluded.city,
                state = excluded.state,
                capacity_mva = excluded.capacity_mva,
                capacity_min_mva = excluded.capacity_min_mva,
                capacity_confidence = excluded.capacity_confidence,
                voltage_level = excluded.voltage_level,
                utility_owner = excluded.utility_owner,
                ownership_confidence = excluded.ownership_confidence,
                ownership_source = excluded.ownership_source,
                interconnection_type = excluded.interconnection_type,
                substation_type = excluded.substation_type,
                load_factor = excluded.load_factor,
                capacity_source = excluded.capacity_source,
                status = excluded.status,
                coordinates_source = excluded.coordinates_source,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&site.id)
        .bind(&site.name)
        .bind(&site.address)
        .bind(latitude)
        .bind(longitude)
        .bind(&city)
        .bind(&state)
        .bind(estimate.map(|e| e.max))
        .bind(estimate.map(|e| e.min))
        .bind(estimate.map(|e| e.confidence))
        .bind(&details.voltage_level)
        .bind(&details.owner)
        .bind(details.ownership_confidence)
        .bind(&details.ownership_source)
        .bind(&details.interconnection_type)
        .bind(&details.substation_type)
        .bind(details.load_factor)
        .bind(&details.capacity_source)
        .bind(site.analysis_status.as_str())
        .bind(site.coordinates_source.as_str())
        .bind(&now_str)
        .bind(&now_str)
        .execute(pool)
        .await?;

        Ok::<(), Error>(())
    })
    .await?;

    tracing::debug!(site = %site.name, "Site stored");
    Ok(now)
}

/// Every stored site, optionally restricted to one coordinates source
///
/// Loaded records are always reported as `completed`.
pub async fn load_sites(
    pool: &SqlitePool,
    source: Option<CoordinatesSource>,
) -> Result<Vec<SiteRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT site_id, name, address, latitude, longitude,
               capacity_mva, capacity_min_mva, capacity_confidence,
               voltage_level, utility_owner, ownership_confidence, ownership_source,
               interconnection_type, substation_type, load_factor, capacity_source,
               coordinates_source, updated_at
        FROM substations
        WHERE ?1 IS NULL OR coordinates_source = ?1
        ORDER BY rowid
        "#,
    )
    .bind(source.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    rows.iter().map(site_from_row).collect()
}

pub async fn count_sites(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM substations")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn site_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SiteRecord> {
    let latitude: f64 = row.get("latitude");
    let longitude: f64 = row.get("longitude");
    let coordinates = Coordinates::new(latitude, longitude).ok();

    let capacity_max: Option<f64> = row.get("capacity_mva");
    let capacity_min: Option<f64> = row.get("capacity_min_mva");
    let confidence: Option<f64> = row.get("capacity_confidence");
    let capacity_estimate = capacity_max.map(|max| CapacityEstimate {
        min: capacity_min.unwrap_or(max),
        max,
        confidence: confidence.unwrap_or(0.0),
    });

    let details = SiteDetails {
        owner: row.get("utility_owner"),
        ownership_confidence: row.get("ownership_confidence"),
        ownership_source: row.get("ownership_source"),
        voltage_level: row.get("voltage_level"),
        interconnection_type: row.get("interconnection_type"),
        substation_type: row.get("substation_type"),
        load_factor: row.get("load_factor"),
        capacity_source: row.get("capacity_source"),
    };

    let source: String = row.get("coordinates_source");
    let coordinates_source =
        CoordinatesSource::from_str(&source).unwrap_or(CoordinatesSource::Discovery);

    let updated_at: String = row.get("updated_at");
    let stored_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| Error::Internal(format!("Failed to parse updated_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(SiteRecord {
        id: row.get("site_id"),
        name: row.get("name"),
        address: row.get("address"),
        coordinates,
        capacity_estimate,
        details: Some(details),
        analysis_status: AnalysisStatus::Completed,
        coordinates_source,
        failure_reason: None,
        stored_at: Some(stored_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;

    fn completed(name: &str, lat: f64, lng: f64, max: f64) -> SiteRecord {
        let mut site = SiteRecord::discovered(
            format!("{}-id", name),
            name.to_string(),
            "7 Wire Ln, Boise, ID 83702, USA".to_string(),
            Coordinates::new(lat, lng).unwrap(),
        );
        site.begin_analysis().unwrap();
        site.complete(
            CapacityEstimate {
                min: max / 2.0,
                max,
                confidence: 0.75,
            },
            SiteDetails {
                owner: Some("Idaho Power".to_string()),
                voltage_level: Some("230kV".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        site
    }

    #[tokio::test]
    async fn test_upsert_same_key_overwrites() {
        let pool = init_memory_pool().await.unwrap();

        upsert_site(&pool, &completed("Boise East", 43.6, -116.2, 100.0), 1000)
            .await
            .unwrap();
        upsert_site(&pool, &completed("Boise East", 43.6, -116.2, 180.0), 1000)
            .await
            .unwrap();

        let sites = load_sites(&pool, None).await.unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].capacity_estimate.unwrap().max, 180.0);
    }

    #[tokio::test]
    async fn test_negative_zero_shares_key() {
        let pool = init_memory_pool().await.unwrap();
        upsert_site(&pool, &completed("Null Island", 0.0, 0.0, 1.0), 1000)
            .await
            .unwrap();
        upsert_site(&pool, &completed("Null Island", -0.0, -0.0, 2.0), 1000)
            .await
            .unwrap();
        assert_eq!(count_sites(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_loaded_rows_are_completed_with_details() {
        let pool = init_memory_pool().await.unwrap();
        upsert_site(&pool, &completed("Boise West", 43.6, -116.3, 60.0), 1000)
            .await
            .unwrap();

        let site = load_sites(&pool, None).await.unwrap().remove(0);
        assert_eq!(site.id, "Boise West-id");
        assert_eq!(site.analysis_status, AnalysisStatus::Completed);
        assert_eq!(site.capacity_estimate.unwrap().min, 30.0);
        assert_eq!(site.capacity_estimate.unwrap().confidence, 0.75);
        let details = site.details.unwrap();
        assert_eq!(details.owner.as_deref(), Some("Idaho Power"));
        assert_eq!(details.voltage_level.as_deref(), Some("230kV"));
        assert!(site.stored_at.is_some());
    }

    #[tokio::test]
    async fn test_source_filter() {
        let pool = init_memory_pool().await.unwrap();
        upsert_site(&pool, &completed("Discovered", 1.0, 1.0, 10.0), 1000)
            .await
            .unwrap();

        let mut manual = SiteRecord::ad_hoc(
            "Manual".to_string(),
            String::new(),
            Some(Coordinates::new(2.0, 2.0).unwrap()),
        );
        manual.begin_analysis().unwrap();
        manual
            .complete(
                CapacityEstimate {
                    min: 1.0,
                    max: 2.0,
                    confidence: 0.5,
                },
                SiteDetails::default(),
            )
            .unwrap();
        upsert_site(&pool, &manual, 1000).await.unwrap();

        let manual_only = load_sites(&pool, Some(CoordinatesSource::Manual)).await.unwrap();
        assert_eq!(manual_only.len(), 1);
        assert_eq!(manual_only[0].name, "Manual");
        assert_eq!(load_sites(&pool, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_site_without_coordinates_rejected() {
        let pool = init_memory_pool().await.unwrap();
        let site = SiteRecord::ad_hoc("Nowhere".to_string(), String::new(), None);
        let err = upsert_site(&pool, &site, 1000).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
