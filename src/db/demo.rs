//! Demo dataset.
//!
//! Seeds a small school database (teachers, classes, students with random
//! marks) so the explorer can be tried without bringing a database.

use crate::db::pool::DbPool;
use crate::error::{ExplorerError, ExplorerResult};
use rand::Rng;
use rand::seq::SliceRandom;
use sqlx::QueryBuilder;
use tracing::info;

pub const DEMO_STUDENT_COUNT: usize = 1000;

const CREATE_TABLES: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS teacher (
        id INTEGER PRIMARY KEY,
        name TEXT,
        subject TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS class (
        id INTEGER PRIMARY KEY,
        name TEXT,
        teacher_id INTEGER,
        FOREIGN KEY (teacher_id) REFERENCES teacher(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS student (
        id INTEGER PRIMARY KEY,
        name TEXT,
        marks INTEGER,
        class_id INTEGER,
        FOREIGN KEY (class_id) REFERENCES class(id)
    )
    "#,
];

const FIRST_NAMES: [&str; 10] = [
    "John", "Emma", "Michael", "Sophia", "James", "Olivia", "William", "Ava", "Daniel", "Mia",
];

const LAST_NAMES: [&str; 10] = [
    "Smith",
    "Johnson",
    "Williams",
    "Brown",
    "Jones",
    "Miller",
    "Davis",
    "Garcia",
    "Rodriguez",
    "Wilson",
];

const SUBJECTS: [&str; 10] = [
    "Mathematics",
    "Data Science",
    "Physics",
    "Chemistry",
    "Biology",
    "Computer Science",
    "Economics",
    "English Literature",
    "History",
    "Psychology",
];

const TEACHERS: [&str; 10] = [
    "Prof. Alan Turing",
    "Prof. Grace Hopper",
    "Prof. Albert Einstein",
    "Prof. Marie Curie",
    "Prof. Charles Darwin",
    "Prof. Donald Knuth",
    "Prof. Adam Smith",
    "Prof. William Shakespeare",
    "Prof. Herodotus",
    "Prof. Sigmund Freud",
];

#[derive(Debug, Clone)]
struct Student {
    id: i64,
    name: String,
    marks: i64,
    class_id: i64,
}

/// Rows inserted by [`seed_demo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoSummary {
    pub teachers: usize,
    pub classes: usize,
    pub students: usize,
}

fn random_students(count: usize) -> Vec<Student> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let first = FIRST_NAMES.choose(&mut rng).copied().unwrap_or("John");
            let last = LAST_NAMES.choose(&mut rng).copied().unwrap_or("Smith");
            Student {
                id: i as i64 + 1,
                name: format!("{} {}", first, last),
                marks: rng.gen_range(35..=100),
                class_id: rng.gen_range(1..=SUBJECTS.len() as i64),
            }
        })
        .collect()
}

/// Expands to the seeding body for one backend. The statements are identical
/// across backends; only the pool type and placeholder syntax differ, and
/// `QueryBuilder` takes care of the latter.
macro_rules! seed_with {
    ($pool:expr, $db:ty, $students:expr) => {{
        let mut tx = $pool.begin().await.map_err(seed_error)?;

        for ddl in CREATE_TABLES {
            sqlx::query(ddl).execute(&mut *tx).await.map_err(seed_error)?;
        }

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM teacher")
            .fetch_one(&mut *tx)
            .await
            .map_err(seed_error)?;
        if existing > 0 {
            return Err(ExplorerError::invalid_input(
                "Demo data is already present in this database",
            ));
        }

        let mut insert_teachers = QueryBuilder::<$db>::new("INSERT INTO teacher (id, name, subject) ");
        insert_teachers.push_values(TEACHERS.iter().zip(SUBJECTS).enumerate(), |mut b, (i, (name, subject))| {
            b.push_bind(i as i64 + 1).push_bind(*name).push_bind(subject);
        });
        insert_teachers.build().execute(&mut *tx).await.map_err(seed_error)?;

        let mut insert_classes = QueryBuilder::<$db>::new("INSERT INTO class (id, name, teacher_id) ");
        insert_classes.push_values(SUBJECTS.iter().enumerate(), |mut b, (i, subject)| {
            b.push_bind(i as i64 + 1).push_bind(*subject).push_bind(i as i64 + 1);
        });
        insert_classes.build().execute(&mut *tx).await.map_err(seed_error)?;

        let mut insert_students = QueryBuilder::<$db>::new("INSERT INTO student (id, name, marks, class_id) ");
        insert_students.push_values($students.iter(), |mut b, s| {
            b.push_bind(s.id)
                .push_bind(s.name.clone())
                .push_bind(s.marks)
                .push_bind(s.class_id);
        });
        insert_students.build().execute(&mut *tx).await.map_err(seed_error)?;

        tx.commit().await.map_err(seed_error)?;
    }};
}

/// Create and fill the demo tables in the connected database.
///
/// Refuses to run when the `teacher` table already has rows.
pub async fn seed_demo(pool: &DbPool) -> ExplorerResult<DemoSummary> {
    let students = random_students(DEMO_STUDENT_COUNT);

    match pool {
        DbPool::Postgres(p) => seed_with!(p, sqlx::Postgres, students),
        DbPool::SQLite(p) => seed_with!(p, sqlx::Sqlite, students),
    }

    let summary = DemoSummary {
        teachers: TEACHERS.len(),
        classes: SUBJECTS.len(),
        students: students.len(),
    };
    info!(
        teachers = summary.teachers,
        classes = summary.classes,
        students = summary.students,
        "Seeded demo dataset"
    );
    Ok(summary)
}

fn seed_error(err: sqlx::Error) -> ExplorerError {
    let message = match &err {
        sqlx::Error::Database(db_err) => db_err.message().to_string(),
        other => other.to_string(),
    };
    ExplorerError::execution(format!("Seeding demo data failed: {}", message), None)
}
