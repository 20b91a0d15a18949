use std::env;

use anyhow::{Context, ensure};
use log::info;
use ndarray::Array1;

use function_set::{Buffer, FunctionSetBuilder, MirrorDevice, SetConfig, functions::Linear};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => {
            SetConfig::load(&path).with_context(|| format!("loading config '{path}'"))?
        }
        None => SetConfig::default(),
    };
    info!("using {config:?}");

    let mut rng = rand::rng();
    let mut set = FunctionSetBuilder::new()
        .config(config)
        .function("encoder", Linear::uniform(4, 8, &mut rng))
        .function("decoder", Linear::uniform(8, 2, &mut rng))
        .build()?;

    for segment in set.layout().segments() {
        info!("{} owns parameters {:?}", segment.name, segment.range);
    }

    let x = Array1::ones(4);
    let hidden = set.named::<Linear>("encoder")?.forward(x.view())?;
    let y = set.named::<Linear>("decoder")?.forward(hidden.view())?;
    info!("forward pass: {y}");

    let mut before = vec![0.; set.scalar_count()];
    set.copy_parameters_to(&mut before)?;

    let device = MirrorDevice::new(config.device);
    set.move_to_gpu(&device)?;
    info!(
        "{} parameters resident on device {}",
        set.parameter_count(),
        config.device.ordinal
    );

    let flat: Vec<Buffer> = set.parameters().into_iter().cloned().collect();
    set.set_parameters(flat)?;
    set.move_to_cpu(&device)?;

    let mut after = vec![0.; set.scalar_count()];
    set.copy_parameters_to(&mut after)?;
    ensure!(before == after, "parameters changed across the device round trip");

    info!("round trip of {} scalars is exact", after.len());
    Ok(())
}
