use std::path::PathBuf;

use anim_core::{
    ActionStatus, AnimAction, AnimControl, AnimLayer, FinishCondition, Locator,
    layer::FadeRequestParams, request::FadeToStateParams,
};
use anyhow::{Context, Result};
use clap::Parser;
use glam::vec3;
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use smol_str::SmolStr;

use scene::{Command, CommandKind, Scene};

mod scene;

/// Step animation actors through a scripted JSON scene.
#[derive(Parser)]
#[command(author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// The scene JSON file with the skeleton, clips, states, layers and commands.
    scene: PathBuf,

    /// The number of frames to step.
    #[arg(long, default_value_t = 60)]
    frames: u64,

    /// The time step in seconds.
    #[arg(long, default_value_t = 1.0 / 30.0)]
    delta_time: f32,

    /// The number of independent actors running the same script.
    #[arg(long, default_value_t = 1)]
    actors: usize,

    /// The spacing between the starting positions of actors.
    #[arg(long, default_value_t = 2.0)]
    spacing: f32,

    #[arg(long, default_value_t = log::LevelFilter::Warn)]
    log_level: log::LevelFilter,

    /// Print the final state of each actor as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ActorReport {
    actor: usize,
    frame: u64,
    align: [f32; 3],
    layers: Vec<LayerReport>,
    actions: Vec<ActionReport>,
    joints: Vec<JointReport>,
    output_controls: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct LayerReport {
    name: SmolStr,
    state: Option<SmolStr>,
    clip: Option<SmolStr>,
    phase: f32,
    instances: usize,
    fade: f32,
}

#[derive(Debug, Serialize)]
struct ActionReport {
    frame: u64,
    layer: SmolStr,
    name: SmolStr,
    status: String,
    completed_frame: Option<u64>,
}

#[derive(Debug, Serialize)]
struct JointReport {
    name: SmolStr,
    position: [f32; 3],
}

struct TrackedAction {
    frame: u64,
    action: AnimAction,
    last_status: ActionStatus,
    completed_frame: Option<u64>,
}

struct Actor {
    index: usize,
    control: AnimControl,
    actions: Vec<TrackedAction>,
}

impl Actor {
    fn new(index: usize, scene: &Scene, spacing: f32) -> Result<Self> {
        let skeleton = scene.skeleton()?;
        let clips = scene.clips()?;
        let actor = scene.actor(&format!("actor{index}"))?;

        let mut control =
            AnimControl::new(skeleton, clips, actor).context("failed to create pose cache")?;
        for config in scene.layer_configs()? {
            let name = config.name.clone();
            control
                .add_layer(config)
                .with_context(|| format!("failed to add layer {name:?}"))?;
        }
        control.set_align(Locator::from_translation(vec3(
            index as f32 * spacing,
            0.0,
            0.0,
        )));

        Ok(Self {
            index,
            control,
            actions: Vec::new(),
        })
    }

    fn issue(&mut self, command: &Command) -> Result<()> {
        let finish = match command.kind.finish() {
            Some(finish) => finish
                .parse::<FinishCondition>()
                .with_context(|| format!("unknown finish condition {finish:?}"))?,
            None => FinishCondition::default(),
        };

        let mut action = AnimAction::new(command.layer.clone());
        match &command.kind {
            CommandKind::FadeToState {
                state, fade_time, ..
            } => {
                let params = FadeToStateParams {
                    anim_fade_time: *fade_time,
                    ..Default::default()
                };
                action.fade_to_state(&mut self.control, state, &params, finish);
            }
            CommandKind::Request {
                transition,
                trigger_phase,
                ..
            } => match trigger_phase {
                Some(phase) => {
                    action.request_deferred(
                        &mut self.control,
                        transition,
                        *phase,
                        finish,
                        None,
                        None,
                    );
                }
                None => {
                    action.request(&mut self.control, transition, finish, None, None);
                }
            },
            CommandKind::FadeToAnim {
                clip,
                fade_time,
                looping,
                ..
            } => {
                let params = FadeRequestParams {
                    fade_time: *fade_time,
                    force_loop: *looping,
                    ..Default::default()
                };
                action.fade_to_anim(&mut self.control, clip, &params, finish);
            }
        }

        debug!(
            "Actor {} frame {}: {} on {:?} is {}",
            self.index,
            self.control.frame(),
            command.kind.name(),
            command.layer,
            action.status()
        );
        self.actions.push(TrackedAction {
            frame: command.frame,
            last_status: action.status(),
            action,
            completed_frame: None,
        });
        Ok(())
    }

    fn run(&mut self, commands: &[Command], frames: u64, delta_time: f32) -> Result<()> {
        for frame in 0..frames {
            for command in commands.iter().filter(|c| c.frame == frame) {
                self.issue(command)?;
            }

            self.control.step(delta_time);

            for tracked in &mut self.actions {
                tracked.action.update(&mut self.control);
                let status = tracked.action.status();
                if status != tracked.last_status {
                    debug!(
                        "Actor {} frame {frame}: {} {} -> {status}",
                        self.index,
                        tracked.action.name(),
                        tracked.last_status
                    );
                    if status == ActionStatus::Completed {
                        tracked.completed_frame = Some(frame);
                    }
                    tracked.last_status = status;
                }
            }
        }
        Ok(())
    }

    fn report(&mut self) -> ActorReport {
        let layers = self
            .control
            .layers()
            .iter()
            .map(|layer| match layer {
                AnimLayer::Simple(simple) => LayerReport {
                    name: simple.name().clone(),
                    state: None,
                    clip: simple.current_instance().map(|i| i.clip_name().clone()),
                    phase: layer.current_phase(),
                    instances: simple.instance_count(),
                    fade: layer.current_fade(),
                },
                AnimLayer::State(state) => LayerReport {
                    name: state.name().clone(),
                    state: state.current_state_id().cloned(),
                    clip: state.current_instance().map(|i| i.clip().name.clone()),
                    phase: layer.current_phase(),
                    instances: state.instance_count(),
                    fade: layer.current_fade(),
                },
            })
            .collect();

        let actions = self
            .actions
            .iter()
            .map(|tracked| ActionReport {
                frame: tracked.frame,
                layer: tracked.action.layer().clone(),
                name: tracked.action.name().clone(),
                status: tracked.action.status().to_string(),
                completed_frame: tracked.completed_frame,
            })
            .collect();

        let names: Vec<_> = self
            .control
            .pose_cache()
            .skeleton()
            .joints
            .iter()
            .map(|j| j.name.clone())
            .collect();
        let cache = self.control.pose_cache_mut();
        let joints = names
            .into_iter()
            .enumerate()
            .filter_map(|(i, name)| {
                cache.joint_locator_ws(i).map(|l| JointReport {
                    name,
                    position: l.translation.to_array(),
                })
            })
            .collect();

        ActorReport {
            actor: self.index,
            frame: self.control.frame(),
            align: self.control.align().translation.to_array(),
            layers,
            actions,
            joints,
            output_controls: self.control.pose_cache().output_controls().to_vec(),
        }
    }
}

fn init_logging(level: log::LevelFilter) -> Result<()> {
    #[cfg(not(feature = "tracing"))]
    {
        simple_logger::SimpleLogger::new()
            .with_level(level)
            .init()
            .context("failed to initialize logger")?;
    }

    #[cfg(feature = "tracing")]
    {
        let level = match level {
            log::LevelFilter::Off => tracing::level_filters::LevelFilter::OFF,
            log::LevelFilter::Error => tracing::level_filters::LevelFilter::ERROR,
            log::LevelFilter::Warn => tracing::level_filters::LevelFilter::WARN,
            log::LevelFilter::Info => tracing::level_filters::LevelFilter::INFO,
            log::LevelFilter::Debug => tracing::level_filters::LevelFilter::DEBUG,
            log::LevelFilter::Trace => tracing::level_filters::LevelFilter::TRACE,
        };
        tracing_subscriber::fmt().with_max_level(level).init();
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level)?;

    let scene = Scene::from_file(&cli.scene)?;

    let start = std::time::Instant::now();
    let reports = (0..cli.actors)
        .into_par_iter()
        .map(|index| {
            let mut actor = Actor::new(index, &scene, cli.spacing)
                .with_context(|| format!("failed to create actor {index}"))?;
            actor.run(&scene.commands, cli.frames, cli.delta_time)?;
            Ok(actor.report())
        })
        .collect::<Result<Vec<_>>>()?;
    info!(
        "Stepped {} actors for {} frames in {:?}",
        cli.actors,
        cli.frames,
        start.elapsed()
    );

    if cli.json {
        let json = serde_json::to_string_pretty(&reports).context("failed to serialize report")?;
        println!("{json}");
    } else {
        for report in &reports {
            print_report(report);
        }
    }

    Ok(())
}

fn print_report(report: &ActorReport) {
    println!(
        "actor {} after {} frames at {:?}",
        report.actor, report.frame, report.align
    );
    for layer in &report.layers {
        println!(
            "  layer {} state {:?} clip {:?} phase {:.3} instances {} fade {:.3}",
            layer.name, layer.state, layer.clip, layer.phase, layer.instances, layer.fade
        );
    }
    for action in &report.actions {
        println!(
            "  action {} on {} from frame {}: {} {:?}",
            action.name, action.layer, action.frame, action.status, action.completed_frame
        );
    }
    for joint in &report.joints {
        println!("  joint {} {:?}", joint.name, joint.position);
    }
}
