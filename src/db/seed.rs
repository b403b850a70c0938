// Demo catalog data for `movie-catalog seed`

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};

use crate::models::sort_key;

struct SeedMovie {
    title: &'static str,
    overview: &'static str,
    rating: f64,
    release: (i32, u32, u32),
    vote_count: i64,
    genres: &'static [&'static str],
    cast: &'static [(&'static str, &'static str)],
}

const GENRES: &[&str] = &[
    "Боевик",
    "Фантастика",
    "Триллер",
    "Драма",
    "Приключения",
    "Криминал",
    "Комедия",
    "Мелодрама",
    "Ужасы",
    "Исторический",
];

const ACTORS: &[&str] = &[
    "Леонардо ДиКаприо",
    "Кристиан Бэйл",
    "Мэттью МакКонахи",
    "Киану Ривз",
    "Рассел Кроу",
    "Том Хэнкс",
    "Брэд Питт",
    "Морган Фриман",
    "Энн Хэтэуэй",
    "Хоакин Феникс",
];

const MOVIES: &[SeedMovie] = &[
    SeedMovie {
        title: "Начало",
        overview: "Кобб — талантливый вор, лучший в опасном искусстве извлечения: кражи ценных секретов из глубин подсознания во время сна.",
        rating: 8.8,
        release: (2010, 7, 16),
        vote_count: 34521,
        genres: &["Фантастика", "Боевик", "Триллер"],
        cast: &[("Леонардо ДиКаприо", "Кобб")],
    },
    SeedMovie {
        title: "Тёмный рыцарь",
        overview: "Бэтмен поднимает ставки в войне с криминалом. С помощью лейтенанта Гордона и прокурора Харви Дента он намерен очистить улицы Готэма.",
        rating: 9.0,
        release: (2008, 7, 18),
        vote_count: 30891,
        genres: &["Боевик", "Криминал", "Драма"],
        cast: &[
            ("Кристиан Бэйл", "Брюс Уэйн / Бэтмен"),
            ("Морган Фриман", "Люциус Фокс"),
        ],
    },
    SeedMovie {
        title: "Интерстеллар",
        overview: "Когда засуха, пыльные бури и вымирание растений приводят человечество к продовольственному кризису, команда исследователей отправляется через червоточину.",
        rating: 8.7,
        release: (2014, 11, 7),
        vote_count: 32456,
        genres: &["Фантастика", "Драма", "Приключения"],
        cast: &[
            ("Мэттью МакКонахи", "Купер"),
            ("Энн Хэтэуэй", "Амелия Бренд"),
        ],
    },
    SeedMovie {
        title: "Матрица",
        overview: "Хакер Нео узнаёт, что его мир — виртуальная реальность, созданная машинами для порабощения людей. Ему предстоит стать избранным.",
        rating: 8.7,
        release: (1999, 3, 31),
        vote_count: 24567,
        genres: &["Фантастика", "Боевик"],
        cast: &[("Киану Ривз", "Нео")],
    },
    SeedMovie {
        title: "Гладиатор",
        overview: "Генерал Максимус, преданный императором, становится рабом и гладиатором. Его единственная цель — месть.",
        rating: 8.5,
        release: (2000, 5, 5),
        vote_count: 16789,
        genres: &["Боевик", "Драма", "Исторический"],
        cast: &[("Рассел Кроу", "Максимус"), ("Хоакин Феникс", "Коммод")],
    },
    SeedMovie {
        title: "Форрест Гамп",
        overview: "Сидя на скамейке, Форрест Гамп рассказывает случайным встречным историю своей необыкновенной жизни.",
        rating: 8.8,
        release: (1994, 7, 6),
        vote_count: 25678,
        genres: &["Драма", "Мелодрама", "Комедия"],
        cast: &[("Том Хэнкс", "Форрест Гамп")],
    },
    SeedMovie {
        title: "Бойцовский клуб",
        overview: "Офисный работник страдает от бессонницы. Случайная встреча с продавцом мыла меняет его жизнь навсегда.",
        rating: 8.8,
        release: (1999, 10, 15),
        vote_count: 27890,
        genres: &["Драма", "Триллер"],
        cast: &[("Брэд Питт", "Тайлер Дёрден")],
    },
    SeedMovie {
        title: "Джокер",
        overview: "Готэм, начало 1980-х. Комик Артур Флек живёт с больной матерью. Однажды он оказывается втянут в череду трагических событий.",
        rating: 8.4,
        release: (2019, 10, 4),
        vote_count: 23456,
        genres: &["Криминал", "Драма", "Триллер"],
        cast: &[("Хоакин Феникс", "Артур Флек / Джокер")],
    },
    SeedMovie {
        title: "Побег из Шоушенка",
        overview: "Бухгалтер Энди Дюфрейн обвинён в убийстве собственной жены и её любовника. Несмотря на невиновность, он приговорён к пожизненному заключению.",
        rating: 9.3,
        release: (1994, 9, 23),
        vote_count: 25789,
        genres: &["Драма", "Криминал"],
        cast: &[("Том Хэнкс", "Энди Дюфрейн"), ("Морган Фриман", "Ред")],
    },
    SeedMovie {
        title: "Леон",
        overview: "Профессиональный убийца Леон берёт под опеку 12-летнюю Матильду, семью которой убили коррумпированные полицейские.",
        rating: 8.5,
        release: (1994, 9, 14),
        vote_count: 12345,
        genres: &["Боевик", "Криминал", "Драма"],
        cast: &[],
    },
];

/// Row totals after seeding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub genres: i64,
    pub actors: i64,
    pub movies: i64,
    pub movies_created: usize,
}

/// Insert the demo genres, actors and movies. Safe to run repeatedly:
/// genres match by name, actors by name (case-insensitive), movies by title.
pub async fn seed(pool: &SqlitePool) -> Result<SeedSummary> {
    let mut tx = pool.begin().await.context("Failed to start seed transaction")?;
    let mut movies_created = 0;

    for movie in MOVIES {
        let release = NaiveDate::from_ymd_opt(movie.release.0, movie.release.1, movie.release.2)
            .with_context(|| format!("Invalid release date for {}", movie.title))?;

        let (movie_id, created) = get_or_create_movie(&mut tx, movie, release).await?;
        if created {
            movies_created += 1;
        }

        for genre in movie.genres {
            let genre_id = get_or_create_genre(&mut tx, genre).await?;
            sqlx::query("INSERT OR IGNORE INTO movie_genres (movie_id, genre_id) VALUES (?, ?)")
                .bind(&movie_id)
                .bind(&genre_id)
                .execute(&mut *tx)
                .await?;
        }

        for (order, (actor, character)) in movie.cast.iter().enumerate() {
            let actor_id = get_or_create_actor(&mut tx, actor).await?;
            link_cast(&mut tx, &movie_id, &actor_id, character, order as i32).await?;
        }

        tracing::info!(
            "Movie: {} - {}",
            movie.title,
            if created { "created" } else { "exists" }
        );
    }

    // Genres and actors with no movie still belong to the demo set
    for genre in GENRES {
        get_or_create_genre(&mut tx, genre).await?;
    }
    for actor in ACTORS {
        get_or_create_actor(&mut tx, actor).await?;
    }

    tx.commit().await.context("Failed to commit seed data")?;

    Ok(SeedSummary {
        genres: count_rows(pool, "genres").await?,
        actors: count_rows(pool, "actors").await?,
        movies: count_rows(pool, "movies").await?,
        movies_created,
    })
}

async fn count_rows(pool: &SqlitePool, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    let row: (i64,) = sqlx::query_as(&sql).fetch_one(pool).await?;
    Ok(row.0)
}

async fn get_or_create_genre(conn: &mut SqliteConnection, name: &str) -> Result<String> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM genres WHERE name = ? ORDER BY rowid LIMIT 1")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;

    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO genres (id, name) VALUES (?, ?)")
        .bind(&id)
        .bind(name)
        .execute(&mut *conn)
        .await?;
    Ok(id)
}

async fn get_or_create_actor(conn: &mut SqliteConnection, name: &str) -> Result<String> {
    let sort_name = sort_key(name);
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM actors WHERE sort_name = ? ORDER BY created_at, rowid LIMIT 1")
            .bind(&sort_name)
            .fetch_optional(&mut *conn)
            .await?;

    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO actors (id, name, sort_name) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(&sort_name)
        .execute(&mut *conn)
        .await?;
    Ok(id)
}

async fn get_or_create_movie(
    conn: &mut SqliteConnection,
    movie: &SeedMovie,
    release: NaiveDate,
) -> Result<(String, bool)> {
    let sort_title = sort_key(movie.title);
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM movies WHERE sort_title = ? ORDER BY created_at, rowid LIMIT 1")
            .bind(&sort_title)
            .fetch_optional(&mut *conn)
            .await?;

    if let Some((id,)) = existing {
        return Ok((id, false));
    }

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO movies (id, title, sort_title, overview, release_date, rating, vote_count)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(movie.title)
    .bind(&sort_title)
    .bind(movie.overview)
    .bind(release)
    .bind(movie.rating)
    .bind(movie.vote_count)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to insert movie {}", movie.title))?;

    Ok((id, true))
}

/// Add a cast row unless this actor is already credited on the movie
async fn link_cast(
    conn: &mut SqliteConnection,
    movie_id: &str,
    actor_id: &str,
    character: &str,
    order: i32,
) -> Result<()> {
    let exists: Option<(String,)> =
        sqlx::query_as("SELECT id FROM movie_cast WHERE movie_id = ? AND actor_id = ? LIMIT 1")
            .bind(movie_id)
            .bind(actor_id)
            .fetch_optional(&mut *conn)
            .await?;

    if exists.is_some() {
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO movie_cast (id, movie_id, actor_id, character, sort_order) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(movie_id)
    .bind(actor_id)
    .bind(character)
    .bind(order)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let pool = db::test_pool().await;

        let first = seed(&pool).await.unwrap();
        assert_eq!(first.genres, GENRES.len() as i64);
        assert_eq!(first.actors, ACTORS.len() as i64);
        assert_eq!(first.movies, MOVIES.len() as i64);
        assert_eq!(first.movies_created, MOVIES.len());

        let second = seed(&pool).await.unwrap();
        assert_eq!(second.movies, first.movies);
        assert_eq!(second.actors, first.actors);
        assert_eq!(second.movies_created, 0);

        let cast: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM movie_cast")
            .fetch_one(&pool)
            .await
            .unwrap();
        let expected: usize = MOVIES.iter().map(|m| m.cast.len()).sum();
        assert_eq!(cast.0, expected as i64);
    }

    #[tokio::test]
    async fn test_seed_reuses_existing_actor_by_name() {
        let pool = db::test_pool().await;
        sqlx::query("INSERT INTO actors (id, name, sort_name) VALUES ('x', 'ТОМ ХЭНКС', 'том хэнкс')")
            .execute(&pool)
            .await
            .unwrap();

        let summary = seed(&pool).await.unwrap();
        assert_eq!(summary.actors, ACTORS.len() as i64);

        let credits: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM movie_cast WHERE actor_id = 'x'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(credits.0, 2);
    }
}
