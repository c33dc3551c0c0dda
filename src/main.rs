#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use drumgrid::{
    config::CONFIG_FILE, midi_note_name, parse_tempo_input, AudioOutput, DrumMachine,
    EngineConfig, MidiOutputDevice, OutputRouter, PlaybackEvent, SharedOutput,
};
#[cfg(feature = "gui")]
use std::fs::File;
#[cfg(feature = "gui")]
use std::io::{BufReader, BufWriter};
#[cfg(feature = "gui")]
use std::sync::{Arc, Mutex, PoisonError};

#[cfg(feature = "gui")]
fn main() -> Result<(), eframe::Error> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| CONFIG_FILE.to_string());
    let config = EngineConfig::load_or_default(&config_path);

    let app = match DrumApp::new(&config) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to start drum machine: {}", e);
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 620.0])
            .with_title("Drumgrid - Beat Machine"),
        ..Default::default()
    };

    eframe::run_native("Drumgrid", options, Box::new(|_cc| Ok(Box::new(app))))
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

#[cfg(feature = "gui")]
const SELECTED: egui::Color32 = egui::Color32::from_rgb(66, 237, 222);
#[cfg(feature = "gui")]
const CURRENT: egui::Color32 = egui::Color32::from_rgb(100, 200, 100);
#[cfg(feature = "gui")]
const BEAT_LIGHT: egui::Color32 = egui::Color32::from_rgb(90, 90, 90);
#[cfg(feature = "gui")]
const BEAT_DARK: egui::Color32 = egui::Color32::from_rgb(45, 45, 45);

#[cfg(feature = "gui")]
struct DrumApp {
    machine: DrumMachine,
    router: Arc<Mutex<OutputRouter>>,
    _audio: Option<AudioOutput>,

    // UI state
    available_midi_ports: Vec<String>,
    selected_port: Option<usize>,
    current_visual_step: Option<usize>,
    tempo_input: String,
    status: Option<String>,
}

#[cfg(feature = "gui")]
impl DrumApp {
    fn new(config: &EngineConfig) -> drumgrid::Result<Self> {
        let audio = AudioOutput::new();
        if audio.is_none() {
            eprintln!("No audio output device available - MIDI output only");
        }

        let available_midi_ports = MidiOutputDevice::available_ports();
        let mut midi = MidiOutputDevice::new();
        let mut selected_port = None;
        if let Some(name) = &config.midi_port {
            match midi.connect_by_name(name) {
                Ok(()) => {
                    selected_port = midi
                        .port_name()
                        .and_then(|p| available_midi_ports.iter().position(|n| n == p));
                }
                Err(e) => eprintln!("{}", e),
            }
        }

        let router = Arc::new(Mutex::new(OutputRouter::new(
            midi,
            audio.as_ref().map(AudioOutput::voices),
        )));
        let output: SharedOutput = router.clone();
        let machine = DrumMachine::new(config, output)?;

        Ok(Self {
            tempo_input: machine.tempo().to_string(),
            machine,
            router,
            _audio: audio,
            available_midi_ports,
            selected_port,
            current_visual_step: None,
            status: None,
        })
    }

    fn handle_playback_events(&mut self) {
        for event in self.machine.poll_events() {
            match event {
                PlaybackEvent::TickAdvanced(tick) => {
                    let step = tick as usize;
                    self.current_visual_step = (step < self.machine.steps()).then_some(step);
                }
                PlaybackEvent::Finished => self.current_visual_step = None,
                PlaybackEvent::NoteOn(..) | PlaybackEvent::NoteOff(_) => {}
            }
        }
    }

    fn connect_port(&mut self, port_idx: usize) {
        let mut router = self.router.lock().unwrap_or_else(PoisonError::into_inner);
        match router.midi_mut().connect(port_idx) {
            Ok(()) => self.selected_port = Some(port_idx),
            Err(e) => self.status = Some(e.to_string()),
        }
    }

    fn apply_tempo(&mut self) {
        // Non-numeric input is ignored and the current tempo stays
        let Some(bpm) = parse_tempo_input(&self.tempo_input) else {
            return;
        };
        match self.machine.set_tempo(bpm) {
            Ok(()) => self.status = None,
            Err(e) => self.status = Some(e.to_string()),
        }
    }

    fn export_pattern(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Pattern", &["txt"])
            .set_file_name("pattern.txt")
            .save_file()
        else {
            return;
        };

        let result = File::create(&path)
            .map_err(drumgrid::SequencerError::from)
            .and_then(|file| self.machine.export_pattern(BufWriter::new(file)));
        self.status = Some(match result {
            Ok(()) => format!("Exported {}", path.display()),
            Err(e) => format!("Export failed: {}", e),
        });
    }

    fn import_pattern(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Pattern", &["txt"])
            .pick_file()
        else {
            return;
        };

        let result = File::open(&path)
            .map_err(drumgrid::SequencerError::from)
            .and_then(|file| self.machine.import_pattern(BufReader::new(file)));
        self.status = Some(match result {
            Ok(()) => format!("Imported {}", path.display()),
            Err(e) => format!("Import failed, pattern unchanged: {}", e),
        });
    }

    fn transport_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if self.machine.is_playing() {
                if ui.button("⏹ Stop").clicked() {
                    self.machine.stop();
                    self.current_visual_step = None;
                }
            } else if ui.button("▶ Play").clicked() {
                self.machine.start();
            }

            if ui.button("Clear").clicked() {
                self.machine.clear();
            }

            let mut looping = self.machine.is_looping();
            if ui.checkbox(&mut looping, "Loop").changed() {
                self.machine.set_looping(looping);
            }

            ui.add_space(20.0);

            ui.label("BPM:");
            ui.add(egui::TextEdit::singleline(&mut self.tempo_input).desired_width(50.0));
            if ui.button("Set Tempo").clicked() {
                self.apply_tempo();
            }
            ui.label(format!("({} BPM)", self.machine.tempo()));

            ui.add_space(20.0);

            if ui.button("Export Beat").clicked() {
                self.export_pattern();
            }
            if ui.button("Import Beat").clicked() {
                self.import_pattern();
            }
        });
    }

    fn step_grid(&mut self, ui: &mut egui::Ui) {
        let pattern = self.machine.pattern();
        let mut toggled = None;
        let mut previewed = None;

        for (row, instrument) in self.machine.registry().iter().enumerate() {
            ui.horizontal(|ui| {
                let label = format!("{} ({})", instrument.name, midi_note_name(instrument.key));
                if ui
                    .add(egui::Button::new(label).min_size(egui::vec2(170.0, 40.0)))
                    .clicked()
                {
                    previewed = Some(row);
                }

                for step in 0..pattern.steps() {
                    let active = pattern.get(row, step).unwrap_or(false);
                    let fill = if active {
                        SELECTED
                    } else if self.current_visual_step == Some(step) {
                        CURRENT
                    } else if (step / 4) % 2 == 0 {
                        BEAT_LIGHT
                    } else {
                        BEAT_DARK
                    };

                    let button = egui::Button::new("")
                        .min_size(egui::vec2(48.0, 40.0))
                        .fill(fill);
                    if ui.add(button).clicked() {
                        toggled = Some((row, step));
                    }
                }
            });
        }

        if let Some(row) = previewed {
            if let Err(e) = self.machine.preview(row) {
                self.status = Some(e.to_string());
            }
        }
        if let Some((row, step)) = toggled {
            if let Err(e) = self.machine.toggle(row, step) {
                self.status = Some(e.to_string());
            }
        }
    }
}

#[cfg(feature = "gui")]
impl eframe::App for DrumApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.handle_playback_events();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Drumgrid - Beat Machine");
            ui.add_space(10.0);

            // MIDI Port Selection
            let mut selected_port_changed = None;
            ui.horizontal(|ui| {
                ui.label("MIDI Output:");
                if self.available_midi_ports.is_empty() {
                    ui.label("No MIDI ports available");
                } else {
                    egui::ComboBox::from_label("")
                        .selected_text(
                            self.selected_port
                                .and_then(|i| self.available_midi_ports.get(i))
                                .map(String::as_str)
                                .unwrap_or("Select port..."),
                        )
                        .show_ui(ui, |ui| {
                            for (i, port_name) in self.available_midi_ports.iter().enumerate() {
                                if ui
                                    .selectable_label(self.selected_port == Some(i), port_name)
                                    .clicked()
                                {
                                    selected_port_changed = Some(i);
                                }
                            }
                        });
                }
            });

            if let Some(port_idx) = selected_port_changed {
                self.connect_port(port_idx);
            }

            ui.add_space(10.0);
            self.transport_controls(ui);

            ui.add_space(20.0);
            self.step_grid(ui);

            // Info
            ui.separator();
            ui.label("Click cells to toggle them, click an instrument to hear it");
            if let Some(status) = &self.status {
                ui.label(status.as_str());
            }

            let router = self.router.lock().unwrap_or_else(PoisonError::into_inner);
            if !router.midi().is_connected() {
                let message = if router.has_synth() {
                    "⚠ No MIDI output connected - built-in kit only"
                } else {
                    "⚠ No MIDI output connected and no audio device - playback is silent"
                };
                ui.colored_label(egui::Color32::YELLOW, message);
            }
        });
    }
}
