use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{info, warn};

use ticketline_catalog::{InventoryError, InventoryLedger, SeatClass, SeatCounts};

/// All-or-nothing reserve. ARGV holds `class, count` pairs.
/// Returns {0, 0} on success, or {i, available} for the first short class
/// (1-based pair index). Nothing is written unless every class has stock.
const RESERVE_SCRIPT: &str = r#"
    local pairs = #ARGV / 2
    for i = 1, pairs do
        local available = tonumber(redis.call("HGET", KEYS[1], ARGV[2 * i - 1]) or "0")
        if available < tonumber(ARGV[2 * i]) then
            return {i, available}
        end
    end
    for i = 1, pairs do
        redis.call("HINCRBY", KEYS[1], ARGV[2 * i - 1], -tonumber(ARGV[2 * i]))
    end
    return {0, 0}
"#;

/// Capacity-capped release. Returns how many classes had to be clamped.
const RELEASE_SCRIPT: &str = r#"
    local clamped = 0
    for i = 1, #ARGV / 2 do
        local class = ARGV[2 * i - 1]
        local capacity = redis.call("HGET", KEYS[1], class .. ":capacity")
        if capacity then
            local restored = tonumber(redis.call("HGET", KEYS[1], class) or "0") + tonumber(ARGV[2 * i])
            if restored > tonumber(capacity) then
                restored = tonumber(capacity)
                clamped = clamped + 1
            end
            redis.call("HSET", KEYS[1], class, restored)
        end
    end
    return clamped
"#;

/// Seat counters shared by every API node.
///
/// One hash per train: field `{class}` holds the available count and
/// `{class}:capacity` the seeded capacity. Both scripts run atomically on
/// the server, so no client-side locking is needed.
#[derive(Clone)]
pub struct RedisInventoryLedger {
    client: redis::Client,
    reserve: redis::Script,
    release: redis::Script,
}

impl RedisInventoryLedger {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            reserve: redis::Script::new(RESERVE_SCRIPT),
            release: redis::Script::new(RELEASE_SCRIPT),
        })
    }

    fn key(train_id: &str) -> String {
        format!("inventory:{}", train_id)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, InventoryError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| InventoryError::Backend(e.to_string()))
    }
}

fn script_args(counts: &SeatCounts) -> Vec<(SeatClass, u32)> {
    counts.iter().filter(|(_, n)| **n > 0).map(|(c, n)| (*c, *n)).collect()
}

fn backend(err: redis::RedisError) -> InventoryError {
    InventoryError::Backend(err.to_string())
}

#[async_trait]
impl InventoryLedger for RedisInventoryLedger {
    /// Counters that already exist keep their live count; only the capacity
    /// is refreshed, so restarting a node never resurrects sold seats. A
    /// missing counter starts at capacity minus the seats already held.
    async fn seed(&self, train_id: &str, class: SeatClass, capacity: u32, held: u32) -> Result<(), InventoryError> {
        let mut conn = self.connection().await?;
        let key = Self::key(train_id);
        let available = capacity.saturating_sub(held);

        let created: bool = conn.hset_nx(&key, class.as_str(), available).await.map_err(backend)?;
        conn.hset::<_, _, _, ()>(&key, format!("{}:capacity", class), capacity)
            .await
            .map_err(backend)?;

        if created {
            info!("Seeded {}/{} with {} of {} seats", train_id, class, available, capacity);
        }
        Ok(())
    }

    async fn reserve(&self, train_id: &str, counts: &SeatCounts) -> Result<(), InventoryError> {
        let wanted = script_args(counts);
        if wanted.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection().await?;
        let mut invocation = self.reserve.key(Self::key(train_id));
        for (class, n) in &wanted {
            invocation.arg(class.as_str()).arg(*n);
        }

        let (short, available): (usize, i64) = invocation.invoke_async(&mut conn).await.map_err(backend)?;
        if short == 0 {
            return Ok(());
        }

        let (seat_class, requested) = wanted
            .get(short - 1)
            .copied()
            .ok_or_else(|| InventoryError::Backend(format!("reserve script returned index {}", short)))?;
        Err(InventoryError::InsufficientStock {
            train_id: train_id.to_string(),
            seat_class,
            requested,
            available: available.max(0) as u32,
        })
    }

    async fn release(&self, train_id: &str, counts: &SeatCounts) -> Result<(), InventoryError> {
        let returned = script_args(counts);
        if returned.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection().await?;
        let mut invocation = self.release.key(Self::key(train_id));
        for (class, n) in &returned {
            invocation.arg(class.as_str()).arg(*n);
        }

        let clamped: u32 = invocation.invoke_async(&mut conn).await.map_err(backend)?;
        if clamped > 0 {
            warn!("Release on {} exceeded capacity for {} seat classes, clamped", train_id, clamped);
        }
        Ok(())
    }

    async fn availability(&self, train_id: &str) -> Result<SeatCounts, InventoryError> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, i64> = conn.hgetall(Self::key(train_id)).await.map_err(backend)?;

        Ok(fields
            .into_iter()
            .filter_map(|(field, n)| field.parse::<SeatClass>().ok().map(|c| (c, n.max(0) as u32)))
            .collect())
    }
}
