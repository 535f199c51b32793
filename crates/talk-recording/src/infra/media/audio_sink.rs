//! Per-session PulseAudio null sink.
//!
//! Each participant plays into its own sink, which the recorder then
//! captures. Sharing the default sink would mix the audio of concurrent
//! recordings.

use std::process::Command;

use tracing::debug;
use tracing::warn;
use uuid::Uuid;

use crate::usecases::ports::AudioSinkHandle;
use crate::usecases::ports::MediaError;

/// PulseAudio rejects longer module names.
const MAX_SINK_NAME_LEN: usize = 127;

pub struct PulseAudioSink {
    name: String,
    module_index: String,
    sink_index: String,
}

fn run(program: &str, args: &[&str]) -> Result<String, MediaError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| MediaError::Spawn {
            program: program.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(MediaError::command(
            format!("{program} {}", args.join(" ")),
            format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `<base>-<random>`, cut to the PulseAudio limit.
pub fn unique_sink_name(base_name: &str) -> String {
    let mut name = format!("{base_name}-{}", Uuid::new_v4().simple());
    if name.len() > MAX_SINK_NAME_LEN {
        let mut cut = MAX_SINK_NAME_LEN;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    name
}

/// Index of `name` in `pactl list short sinks` output.
pub fn find_sink_index(listing: &str, name: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let mut fields = line.split('\t');
        let index = fields.next()?;
        (fields.next()? == name).then(|| index.trim().to_string())
    })
}

impl PulseAudioSink {
    pub fn create(base_name: &str) -> Result<Self, MediaError> {
        // Long idle time so the daemon does not exit before the call is joined.
        run("pulseaudio", &["--start", "--exit-idle-time=120"])?;

        let name = unique_sink_name(base_name);
        let module_index = run(
            "pactl",
            &["load-module", "module-null-sink", &format!("sink_name={name}")],
        )?
        .trim()
        .to_string();

        let listing = run("pactl", &["list", "short", "sinks"]);
        let sink_index = match listing.map(|l| find_sink_index(&l, &name)) {
            Ok(Some(index)) => index,
            Ok(None) => {
                unload_module(&module_index);
                return Err(MediaError::NotReady {
                    resource: "audio sink",
                    reason: format!("sink {name} not found after loading module {module_index}"),
                });
            }
            Err(e) => {
                unload_module(&module_index);
                return Err(e);
            }
        };

        debug!(sink = %name, module = %module_index, index = %sink_index, "Audio sink created");
        Ok(Self {
            name,
            module_index,
            sink_index,
        })
    }
}

fn unload_module(module_index: &str) {
    if let Err(e) = run("pactl", &["unload-module", module_index]) {
        warn!(module = module_index, error = %e, "Failed to unload audio module");
    }
}

impl AudioSinkHandle for PulseAudioSink {
    fn sink_id(&self) -> String {
        self.sink_index.clone()
    }

    fn release(&self) -> Result<(), MediaError> {
        debug!(sink = %self.name, module = %self.module_index, "Unloading audio module");
        run("pactl", &["unload-module", &self.module_index]).map(|_| ())
    }
}
