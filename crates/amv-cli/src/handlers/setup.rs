//! Runtime switching and dependency installation.

use super::pump;
use amv_core::{CancellationToken, SetupType, Toolkit};
use amv_setup::{CommandRunner, DependencyChecker, ModeSwitcher, RunResult, StepEvent, SwitchPlanner};
use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

fn print_step(event: &StepEvent) {
    match event {
        StepEvent::Started { index, total, label } => println!("({}/{}) {}...", index, total, label),
        StepEvent::Manual { index, label } => println!("({}) Manual step: {}", index, label),
        StepEvent::Succeeded { index } => println!("({}) done", index),
        StepEvent::Failed { index, message } => println!("({}) failed: {}", index, message),
    }
}

fn print_errors(result: &RunResult) {
    for error in &result.errors {
        eprintln!("  Step {} ({}): {}", error.index, error.label, error.message);
    }
}

pub async fn switch(toolkit: Arc<Toolkit>, target: SetupType) -> Result<()> {
    let token = CancellationToken::new();
    let runner = CommandRunner::process()
        .with_audit(toolkit.audit().clone())
        .with_cancellation(token.clone());
    let switcher = ModeSwitcher::new(
        toolkit.store().clone(),
        Arc::clone(toolkit.probe()),
        SwitchPlanner::from_tools(toolkit.tools()),
        runner,
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        switcher
            .switch(target, move |event| {
                let _ = tx.send(event);
            })
            .await
    });
    pump(rx, Some(&token), print_step).await;
    let outcome = task.await??;

    if outcome.committed {
        if outcome.plan.already_satisfied {
            println!("Runtime already set up for {}. Mode saved.", target);
        } else {
            println!("Switched to {}. Restart any running sessions.", target);
        }
        return Ok(());
    }

    if outcome.result.cancelled {
        bail!("Switch cancelled; mode left at {}", outcome.record.setup_type);
    }
    print_errors(&outcome.result);
    bail!(
        "{} step(s) failed; mode left at {}. Re-run to retry.",
        outcome.result.errors.len(),
        outcome.record.setup_type
    )
}

pub async fn doctor(toolkit: Arc<Toolkit>, install: bool) -> Result<()> {
    let checker = DependencyChecker::from_tools(toolkit.tools());
    let report = checker.check().await;

    for status in &report.components {
        println!(
            "{:<16} {}",
            status.component.to_string(),
            if status.installed { "installed" } else { "MISSING" }
        );
    }
    if report.all_installed() {
        println!("All dependencies present.");
        return Ok(());
    }

    let plan = checker.install_plan(&report);
    if !install {
        println!("\nRequired actions:");
        for step in &plan.steps {
            if step.is_informational {
                println!("  # {}", step.label);
            } else {
                println!("  {}", amv_core::audit::format_argv(&step.argv));
            }
        }
        println!("\nRun `amv doctor --install` to install them.");
        return Ok(());
    }

    let token = CancellationToken::new();
    let runner = CommandRunner::process()
        .with_audit(toolkit.audit().clone())
        .with_cancellation(token.clone());
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        runner
            .run(&plan, move |event| {
                let _ = tx.send(event);
            })
            .await
    });
    pump(rx, Some(&token), print_step).await;
    let result = task.await?;

    if !result.is_success() {
        print_errors(&result);
        bail!("Installation incomplete");
    }
    println!("Installation complete. Run `amv doctor` again to verify.");
    Ok(())
}
