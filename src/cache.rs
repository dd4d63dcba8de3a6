use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{ReservationError, ReservationResult};
use crate::models::Seat;
use crate::redis_client::RedisClient;

const SEAT_MAP_TTL_SECS: u64 = 24 * 60 * 60;

/// Result of a seat map read.
#[derive(Debug, Clone)]
pub enum SeatMapLookup {
    Hit(Vec<Seat>),
    /// Nothing cached for the current generation. A fill must be written
    /// back with this generation.
    Miss { generation: u64 },
}

/// Redis copy of each event's base seat rows.
///
/// Only persisted seat columns are cached. Lock overlays change far more
/// often than the seat rows and are always read live from the store.
///
/// Entries live under `seats:{event}:{generation}`. Invalidation bumps
/// `seats:{event}:gen`, so a fill that read the store before an invalidation
/// lands under a generation nobody reads any more.
#[derive(Clone)]
pub struct SeatMapCache {
    redis: RedisClient,
}

impl SeatMapCache {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    pub fn generation_key(event_id: i64) -> String {
        format!("seats:{}:gen", event_id)
    }

    pub fn entry_key(event_id: i64, generation: u64) -> String {
        format!("seats:{}:{}", event_id, generation)
    }

    /// An entry that no longer deserializes counts as a miss.
    pub async fn lookup(&self, event_id: i64) -> ReservationResult<SeatMapLookup> {
        let mut conn = self.redis.conn.clone();
        let generation: Option<u64> = conn.get(Self::generation_key(event_id)).await?;
        let generation = generation.unwrap_or(0);
        let raw: Option<String> = conn.get(Self::entry_key(event_id, generation)).await?;

        match raw {
            Some(json) => match serde_json::from_str(&json) {
                Ok(seats) => {
                    debug!(event_id, generation, "seat map cache hit");
                    Ok(SeatMapLookup::Hit(seats))
                }
                Err(e) => {
                    warn!(event_id, error = %e, "discarding unreadable seat map cache entry");
                    Ok(SeatMapLookup::Miss { generation })
                }
            },
            None => Ok(SeatMapLookup::Miss { generation }),
        }
    }

    pub async fn save_seats(&self, event_id: i64, generation: u64, seats: &[Seat]) -> ReservationResult<()> {
        let json = serde_json::to_string(seats).map_err(|e| ReservationError::Internal(e.to_string()))?;
        let mut conn = self.redis.conn.clone();
        let _: () = conn
            .set_ex(Self::entry_key(event_id, generation), json, SEAT_MAP_TTL_SECS)
            .await?;
        Ok(())
    }

    pub async fn invalidate(&self, event_id: i64) -> ReservationResult<()> {
        let mut conn = self.redis.conn.clone();
        let generation: u64 = conn.incr(Self::generation_key(event_id), 1).await?;
        info!("Invalidated seats cache for event {} (generation {})", event_id, generation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_generation_has_its_own_entry() {
        assert_eq!(SeatMapCache::entry_key(7, 0), "seats:7:0");
        assert_ne!(SeatMapCache::entry_key(7, 0), SeatMapCache::entry_key(7, 1));
        assert_eq!(SeatMapCache::generation_key(7), "seats:7:gen");
    }
}
