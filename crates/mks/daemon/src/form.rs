//! Interactive terminal form for the launch parameters.
//!
//! Each prompt shows the current value; Enter keeps it. Numbers that fail to
//! parse or fall outside their range are rejected and asked again.

use std::fmt::Display;
use std::ops::RangeInclusive;

use dialoguer::Input;

use crate::config::{LaunchParams, SwarmConfig};
use crate::error::DaemonResult;

pub const KERNEL_BATCH_RANGE: RangeInclusive<usize> = 5..=50;
pub const LOOP_MINUTES_RANGE: RangeInclusive<u64> = 1..=60;

pub fn check_kernel_batch(value: usize) -> Result<(), String> {
    check_range(value, &KERNEL_BATCH_RANGE)
}

pub fn check_loop_minutes(value: u64) -> Result<(), String> {
    check_range(value, &LOOP_MINUTES_RANGE)
}

fn check_range<T: PartialOrd + Display>(value: T, range: &RangeInclusive<T>) -> Result<(), String> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "Please enter a whole number between {} and {}.",
            range.start(),
            range.end()
        ))
    }
}

/// Pull a configured value into the form's range so Enter always accepts.
fn seed<T: PartialOrd + Copy>(value: T, range: &RangeInclusive<T>) -> T {
    if value < *range.start() {
        *range.start()
    } else if value > *range.end() {
        *range.end()
    } else {
        value
    }
}

fn prompt_text(label: &str, default: &str) -> DaemonResult<String> {
    let answer: String = Input::new()
        .with_prompt(label)
        .default(default.to_string())
        .interact_text()?;
    Ok(answer.trim().to_string())
}

/// Prompt for all five launch parameters, seeded from `defaults`.
pub fn prompt_launch_params(defaults: &SwarmConfig) -> DaemonResult<LaunchParams> {
    println!("Meme-Kernel Swarm launch parameters (Enter keeps the default)");

    let fb_query = prompt_text("Facebook search term", &defaults.sources.facebook.search_term)?;
    let reddit_sub = prompt_text("Reddit subreddit", &defaults.sources.reddit.subreddit)?;
    let tiktok_tag = prompt_text("TikTok tag", &defaults.sources.tiktok.tag)?;

    let kernel_batch = Input::<usize>::new()
        .with_prompt(format!(
            "Kernels per cycle ({}-{})",
            KERNEL_BATCH_RANGE.start(),
            KERNEL_BATCH_RANGE.end()
        ))
        .default(seed(defaults.schedule.kernel_batch, &KERNEL_BATCH_RANGE))
        .validate_with(|value: &usize| check_kernel_batch(*value))
        .interact_text()?;

    let loop_minutes = Input::<u64>::new()
        .with_prompt(format!(
            "Loop interval in minutes ({}-{})",
            LOOP_MINUTES_RANGE.start(),
            LOOP_MINUTES_RANGE.end()
        ))
        .default(seed(defaults.schedule.loop_minutes, &LOOP_MINUTES_RANGE))
        .validate_with(|value: &u64| check_loop_minutes(*value))
        .interact_text()?;

    Ok(LaunchParams {
        fb_query: Some(fb_query),
        reddit_sub: Some(reddit_sub),
        tiktok_tag: Some(tiktok_tag),
        kernel_batch: Some(kernel_batch),
        loop_minutes: Some(loop_minutes),
    })
}
