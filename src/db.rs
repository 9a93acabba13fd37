use crate::error::{EdgeWriteError, StoreError};
use crate::extract::Post;
use crate::graph::{self, EdgePolicy};
use crate::schema::{graph as graph_table, tweets};
use crate::settings::Store;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::time::Duration;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout_ms: u64,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        configure_connection(conn, self.busy_timeout_ms).map_err(diesel::r2d2::Error::QueryError)
    }
}

pub fn configure_connection(conn: &mut SqliteConnection, busy_timeout_ms: u64) -> QueryResult<()> {
    conn.batch_execute(&format!("PRAGMA busy_timeout = {busy_timeout_ms};"))?;
    conn.batch_execute("PRAGMA synchronous = NORMAL;")?;
    conn.batch_execute("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

pub fn establish_pool(database_url: &str, store: &Store) -> Result<DbPool, StoreError> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder()
        .max_size(store.pool_size)
        .connection_timeout(Duration::from_secs(store.pool_timeout_secs))
        .connection_customizer(Box::new(ConnectionOptions {
            busy_timeout_ms: store.busy_timeout_ms,
        }))
        .build(manager)
        .map_err(|e| StoreError::Connect(format!("{database_url}: {e}")))
}

/// Creates both tables if needed. Runs once per process, before streaming starts.
pub fn ensure_schema(conn: &mut SqliteConnection) -> Result<usize, StoreError> {
    conn.batch_execute("PRAGMA journal_mode = WAL;")
        .map_err(|e| StoreError::Schema(e.to_string()))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map(|applied| applied.len())
        .map_err(|e| StoreError::Schema(e.to_string()))
}

#[derive(Queryable, Selectable, Debug, PartialEq)]
#[diesel(table_name = tweets)]
pub struct Tweet {
    pub tweet_id: String,
    pub created_at: NaiveDate,
    pub text: String,
    pub symbols: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = tweets)]
pub struct NewTweet<'a> {
    pub tweet_id: &'a str,
    pub created_at: NaiveDate,
    pub text: &'a str,
    pub symbols: String,
}

impl<'a> From<&'a Post> for NewTweet<'a> {
    fn from(post: &'a Post) -> Self {
        Self {
            tweet_id: &post.id,
            created_at: post.created_at.date_naive(),
            text: &post.text,
            symbols: post.joined_symbols(),
        }
    }
}

#[derive(Queryable, Selectable, Debug, PartialEq)]
#[diesel(table_name = graph_table)]
pub struct Edge {
    pub id: i32,
    pub tweet_id: String,
    pub created_at: NaiveDateTime,
    pub source: String,
    pub target: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = graph_table)]
pub struct NewEdge<'a> {
    pub tweet_id: &'a str,
    pub created_at: NaiveDateTime,
    pub source: &'a str,
    pub target: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    DuplicateIgnored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Persisted {
    pub post: UpsertOutcome,
    pub edges: usize,
}

pub fn upsert_post(conn: &mut SqliteConnection, post: &Post) -> Result<UpsertOutcome, StoreError> {
    match diesel::insert_into(tweets::table)
        .values(NewTweet::from(post))
        .execute(conn)
    {
        Ok(_) => Ok(UpsertOutcome::Inserted),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            Ok(UpsertOutcome::DuplicateIgnored)
        }
        Err(e) => Err(StoreError::Write(e)),
    }
}

fn edge_exists(conn: &mut SqliteConnection, edge: &NewEdge<'_>) -> QueryResult<bool> {
    use crate::schema::graph::dsl::*;

    diesel::select(diesel::dsl::exists(
        graph
            .filter(tweet_id.eq(edge.tweet_id))
            .filter(source.eq(edge.source))
            .filter(target.eq(edge.target)),
    ))
    .get_result(conn)
}

/// Writes one row per edge. Edges are independent writes, so a failure
/// leaves earlier edges of the same post in place.
pub fn upsert_edges(
    conn: &mut SqliteConnection,
    post: &Post,
    source: &str,
    policy: EdgePolicy,
) -> Result<usize, EdgeWriteError> {
    let created_at = post.created_at.naive_utc();
    let mut written = 0;

    for edge in graph::edges(post, source) {
        let row = NewEdge {
            tweet_id: &post.id,
            created_at,
            source: edge.source,
            target: edge.target,
        };

        let result = match policy {
            EdgePolicy::SkipExisting => match edge_exists(conn, &row) {
                Ok(true) => continue,
                Ok(false) => diesel::insert_into(graph_table::table).values(&row).execute(conn),
                Err(e) => Err(e),
            },
            EdgePolicy::Accumulate => diesel::insert_into(graph_table::table).values(&row).execute(conn),
        };

        match result {
            Ok(_) => written += 1,
            Err(err) => return Err(EdgeWriteError { written, source: err }),
        }
    }

    Ok(written)
}

pub fn tweet_count(conn: &mut SqliteConnection) -> QueryResult<i64> {
    tweets::table.count().get_result(conn)
}

pub fn find_tweet(conn: &mut SqliteConnection, id: &str) -> QueryResult<Option<Tweet>> {
    tweets::table
        .find(id)
        .select(Tweet::as_select())
        .first(conn)
        .optional()
}

pub fn edges_for_tweet(conn: &mut SqliteConnection, wanted: &str) -> QueryResult<Vec<Edge>> {
    use crate::schema::graph::dsl::*;

    graph
        .filter(tweet_id.eq(wanted))
        .order(id.asc())
        .select(Edge::as_select())
        .load(conn)
}

pub fn edge_count(conn: &mut SqliteConnection) -> QueryResult<i64> {
    graph_table::table.count().get_result(conn)
}

/// Pooled access to the store. Cloning shares the pool.
#[derive(Clone)]
pub struct Gateway {
    pool: DbPool,
    edge_policy: EdgePolicy,
}

impl Gateway {
    /// Builds the pool and brings the schema up to date.
    pub fn open(database_url: &str, store: &Store, edge_policy: EdgePolicy) -> Result<Self, StoreError> {
        let pool = establish_pool(database_url, store)?;
        {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Connect(e.to_string()))?;
            ensure_schema(&mut conn)?;
        }
        Ok(Self { pool, edge_policy })
    }

    pub fn edge_policy(&self) -> EdgePolicy {
        self.edge_policy
    }

    pub fn pool_size(&self) -> u32 {
        self.pool.max_size()
    }

    fn connection(
        &self,
    ) -> Result<diesel::r2d2::PooledConnection<ConnectionManager<SqliteConnection>>, StoreError> {
        self.pool
            .get()
            .map_err(|e| StoreError::PoolExhausted(e.to_string()))
    }

    pub fn upsert_post(&self, post: &Post) -> Result<UpsertOutcome, StoreError> {
        let mut conn = self.connection()?;
        upsert_post(&mut conn, post)
    }

    /// Post row first, then its edges, on one borrowed connection.
    pub fn persist(&self, post: &Post, source: &str) -> Result<Persisted, StoreError> {
        let mut conn = self.connection()?;
        let outcome = upsert_post(&mut conn, post)?;
        let edges = upsert_edges(&mut conn, post, source, self.edge_policy).map_err(|err| {
            StoreError::PartialEdges {
                post: outcome,
                written: err.written,
                source: err.source,
            }
        })?;
        Ok(Persisted {
            post: outcome,
            edges,
        })
    }

    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut SqliteConnection) -> QueryResult<T>,
    ) -> Result<T, StoreError> {
        let mut conn = self.connection()?;
        f(&mut conn).map_err(StoreError::Write)
    }
}
