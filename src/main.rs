use std::io::{self, Write};

use backbone_heads::{
    DenseNetKan, Device, RunConfig, Vgg16Classifier, count_trainable_parameters,
    estimate_model_size_bytes, report_parameters, write_trainable_total,
};
use log::{debug, info};
use nn::Module;

const BANNER_WIDTH: usize = 80;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let device = Device::detect();
    device.init();
    println!("Using device: {device}");

    let config = RunConfig::from_env()?;
    info!("running {config:?}");

    let model: Box<dyn Module> = match &config {
        RunConfig::Vgg16(config) => {
            banner("VGG16 MODEL");
            let model = Vgg16Classifier::new(config)?;
            debug!("model architecture:\n{model:#?}");
            Box::new(model)
        }
        RunConfig::DensenetKan(config) => {
            banner("DENSENET + KAN MODEL");
            let model = DenseNetKan::new(config)?;
            debug!("model architecture:\n{model:#?}");
            Box::new(model)
        }
    };

    let mut stdout = io::stdout().lock();
    report_parameters(model.as_ref(), &mut stdout)?;
    writeln!(stdout, "Model size: {:.2} MB", estimate_model_size_bytes(model.as_ref()))?;
    match config {
        RunConfig::Vgg16(_) => write_trainable_total(model.as_ref(), &mut stdout)?,
        RunConfig::DensenetKan(_) => writeln!(
            stdout,
            "Total trainable parameters: {}",
            count_trainable_parameters(model.as_ref())
        )?,
    }
    writeln!(stdout, "\nCleaning up...")?;

    drop(model);
    info!("model released");

    if let RunConfig::DensenetKan(_) = config {
        writeln!(stdout, "Done! DenseNet + KAN model complete.")?;
    }
    stdout.flush()?;

    Ok(())
}

fn banner(title: &str) {
    let rule = "=".repeat(BANNER_WIDTH);
    println!("{rule}\n{title}\n{rule}");
}
