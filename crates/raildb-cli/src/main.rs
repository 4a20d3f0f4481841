//! RailDB command-line front end.
//!
//! Reads `[ts] cmd -k v ...` lines from stdin, one command at a time,
//! and prints each command's output prefixed with its timestamp.

mod command;

use command::Command;
use raildb_common::{Result, StorageConfig};
use raildb_core::train::AddTrainArgs;
use raildb_core::user::ProfileUpdate;
use raildb_core::{BuyOutcome, RailDb, SortPref};
use std::io::{self, BufRead, BufWriter, Write};

fn main() -> Result<()> {
    env_logger::init();

    let data_dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./data".to_string());
    let mut db = RailDb::open(&StorageConfig::with_dir(data_dir))?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    for line in stdin.lock().lines() {
        let line = line?;
        let Some(cmd) = Command::parse(&line) else {
            continue;
        };
        let output = dispatch(&mut db, &cmd)?;
        writeln!(out, "[{}] {}", cmd.ts, output)?;
        if cmd.name == "exit" {
            break;
        }
        out.flush()?;
    }
    out.flush()?;
    Ok(())
}

fn code(ok: bool) -> String {
    let out = if ok { "0" } else { "-1" };
    out.to_string()
}

fn dispatch(db: &mut RailDb, cmd: &Command) -> Result<String> {
    Ok(match cmd.name.as_str() {
        "add_user" => {
            let privilege = cmd.arg('g').and_then(|g| g.parse().ok()).unwrap_or(-1);
            code(db.add_user(
                cmd.arg_or('c', ""),
                cmd.arg_or('u', ""),
                cmd.arg_or('p', ""),
                cmd.arg_or('n', ""),
                cmd.arg_or('m', ""),
                privilege,
            )?)
        }
        "login" => code(db.login(cmd.arg_or('u', ""), cmd.arg_or('p', ""))?),
        "logout" => code(db.logout(cmd.arg_or('u', ""))),
        "query_profile" => db
            .query_profile(cmd.arg_or('c', ""), cmd.arg_or('u', ""))?
            .unwrap_or_else(|| "-1".to_string()),
        "modify_profile" => {
            let update = ProfileUpdate {
                password: cmd.arg('p'),
                name: cmd.arg('n'),
                mail_addr: cmd.arg('m'),
                privilege: cmd.arg('g').and_then(|g| g.parse().ok()),
            };
            db.modify_profile(cmd.arg_or('c', ""), cmd.arg_or('u', ""), &update)?
                .unwrap_or_else(|| "-1".to_string())
        }
        "add_train" => code(db.add_train(&AddTrainArgs {
            train_id: cmd.arg_or('i', ""),
            station_count: cmd.arg_or('n', ""),
            seat_count: cmd.arg_or('m', ""),
            stations: cmd.arg_or('s', ""),
            prices: cmd.arg_or('p', ""),
            start_time: cmd.arg_or('x', ""),
            travel_times: cmd.arg_or('t', ""),
            stopover_times: cmd.arg_or('o', ""),
            sale_dates: cmd.arg_or('d', ""),
            train_type: cmd.arg_or('y', ""),
        })?),
        "delete_train" => code(db.delete_train(cmd.arg_or('i', ""))?),
        "release_train" => code(db.release_train(cmd.arg_or('i', ""))?),
        "query_train" => db.query_train(cmd.arg_or('i', ""), cmd.arg_or('d', ""))?,
        "query_ticket" => db.query_ticket(
            cmd.arg_or('s', ""),
            cmd.arg_or('t', ""),
            cmd.arg_or('d', ""),
            SortPref::parse(cmd.arg_or('p', "time")),
        )?,
        "query_transfer" => db.query_transfer(
            cmd.arg_or('s', ""),
            cmd.arg_or('t', ""),
            cmd.arg_or('d', ""),
            SortPref::parse(cmd.arg_or('p', "time")),
        )?,
        "buy_ticket" => {
            let tickets = cmd.arg('n').and_then(|n| n.parse().ok()).unwrap_or(0);
            let queue = cmd.arg_or('q', "false") == "true";
            match db.buy_ticket(
                cmd.ts,
                cmd.arg_or('u', ""),
                cmd.arg_or('i', ""),
                cmd.arg_or('d', ""),
                tickets,
                cmd.arg_or('f', ""),
                cmd.arg_or('t', ""),
                queue,
            )? {
                BuyOutcome::Booked(total) => total.to_string(),
                BuyOutcome::Queued => "queue".to_string(),
                BuyOutcome::Refused => "-1".to_string(),
            }
        }
        "query_order" => db
            .query_order(cmd.arg_or('u', ""))?
            .unwrap_or_else(|| "-1".to_string()),
        "refund_ticket" => {
            let n = cmd.arg('n').and_then(|n| n.parse().ok()).unwrap_or(1);
            code(db.refund_ticket(cmd.arg_or('u', ""), n)?)
        }
        "clean" => {
            db.clean()?;
            "0".to_string()
        }
        "exit" => {
            db.shutdown()?;
            "bye".to_string()
        }
        other => {
            log::error!("unidentified command: {}", other);
            std::process::exit(1);
        }
    })
}
