//! 遥控录制命令
//!
//! 从标准输入逐行读取按键事件：
//!
//! ```text
//! press a maju      # 按下（a/b + maju/mundur）
//! release a         # 松开
//! halt              # 两个通道同时松开
//! done              # 结束并打印路径
//! ```
//!
//! 录制期间距离轮询与安全联锁一直在线；结束时打印路径文本，
//! 可直接作为 `rth --path` 的参数。

use super::config::CliConfig;
use crate::session::{Session, TargetArgs, TraceArgs};
use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use witank_client::Teleop;
use witank_driver::{SafetyInterlock, SendOutcome};
use witank_protocol::{DriveAction, DriveChannel, format_path};

/// 录制命令参数
#[derive(Args, Debug)]
pub struct RecordCommand {
    /// 同时把路径写入文件
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 不启用安全联锁（仅用于调试）
    #[arg(long)]
    pub no_interlock: bool,

    #[command(flatten)]
    pub trace: TraceArgs,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// 一行输入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line {
    Press(DriveChannel, DriveAction),
    Release(DriveChannel),
    Halt,
    Done,
    Blank,
}

fn parse_line(line: &str) -> Result<Line, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let channel = |s: &str| DriveChannel::try_from(s).map_err(|e| e.to_string());
    match words.as_slice() {
        [] => Ok(Line::Blank),
        ["press", ch, act] => {
            let action = DriveAction::try_from(*act).map_err(|e| e.to_string())?;
            if action.is_stop() {
                return Err("press 只接受 maju / mundur".to_string());
            }
            Ok(Line::Press(channel(*ch)?, action))
        },
        ["release", ch] => Ok(Line::Release(channel(*ch)?)),
        ["halt"] => Ok(Line::Halt),
        ["done"] | ["quit"] | ["exit"] => Ok(Line::Done),
        _ => Err(format!(
            "无法识别: {line:?}（press <a|b> <maju|mundur> / release <a|b> / halt / done）"
        )),
    }
}

impl RecordCommand {
    pub async fn execute(&self, config: &CliConfig) -> Result<()> {
        let session = Session::open(&self.target, config)?;
        let trace_dropped = session.trace_commands(&self.trace);
        let monitor = session.monitor();
        monitor.start_polling(&session.host);

        let interlock = (!self.no_interlock).then(|| {
            SafetyInterlock::engage(
                monitor.subscribe(),
                Arc::clone(&session.dispatcher),
                &session.host,
            )
        });

        let teleop = Teleop::new(
            Arc::clone(&session.dispatcher),
            session.host.clone(),
            config.recorder,
            config.teleop,
        );
        teleop.start_record();
        println!("⏺️  录制中，输入 press/release/halt/done");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.context("读取标准输入失败")?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                break;
            };

            let outcome = match parse_line(&line) {
                Ok(Line::Press(channel, action)) => teleop.press(channel, action),
                Ok(Line::Release(channel)) => teleop.release(channel),
                Ok(Line::Halt) => {
                    teleop.halt();
                    continue;
                },
                Ok(Line::Done) => break,
                Ok(Line::Blank) => continue,
                Err(message) => {
                    eprintln!("{message}");
                    continue;
                },
            };
            if let SendOutcome::Rejected(reason) = outcome {
                println!("⛔ 被拒绝: {reason:?}（{}）", monitor.safety_state());
            } else if !teleop.motion_admitted() {
                println!("⛔ 当前组合 {} 处于锁定中", teleop.current_class());
            }
        }

        teleop.halt();
        let segments = teleop.stop_record();
        if let Some(interlock) = &interlock {
            interlock.disengage();
        }
        monitor.stop_polling();
        session.finish().await;
        Session::report_trace(trace_dropped.as_ref());

        let path = format_path(&segments);
        println!("✅ 录制完成: {} 段", segments.len());
        println!("{path}");
        if let Some(output) = &self.output {
            fs::write(output, format!("{path}\n"))
                .with_context(|| format!("写入路径文件失败: {}", output.display()))?;
            println!("💾 已保存到 {}", output.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line("press a maju").unwrap(),
            Line::Press(DriveChannel::A, DriveAction::Forward)
        );
        assert_eq!(
            parse_line("  press B mundur ").unwrap(),
            Line::Press(DriveChannel::B, DriveAction::Reverse)
        );
        assert_eq!(parse_line("release b").unwrap(), Line::Release(DriveChannel::B));
        assert_eq!(parse_line("halt").unwrap(), Line::Halt);
        assert_eq!(parse_line("done").unwrap(), Line::Done);
        assert_eq!(parse_line("   ").unwrap(), Line::Blank);
    }

    #[test]
    fn test_parse_line_rejects_garbage() {
        assert!(parse_line("press a stop").is_err());
        assert!(parse_line("press c maju").is_err());
        assert!(parse_line("release").is_err());
        assert!(parse_line("jump").is_err());
    }
}
