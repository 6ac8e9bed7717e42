/// `sync migrate` against a real database, run twice. Skipped if
/// `SYNC_DATABASE_URL` is not set — mirrors the DB-backed CLI scenario
/// tests' skip convention rather than failing CI environments with no
/// database configured.
#[tokio::test]
async fn cli_migrate_twice_against_the_same_database_is_a_no_op_the_second_time() -> anyhow::Result<()> {
    let url = match std::env::var("SYNC_DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: SYNC_DATABASE_URL not set");
            return Ok(());
        }
    };

    let mut first = assert_cmd::Command::cargo_bin("sync")?;
    first
        .env("SYNC_DATABASE_URL", &url)
        .args(["migrate"])
        .assert()
        .success();

    let mut second = assert_cmd::Command::cargo_bin("sync")?;
    second
        .env("SYNC_DATABASE_URL", &url)
        .args(["migrate"])
        .assert()
        .success();

    Ok(())
}
