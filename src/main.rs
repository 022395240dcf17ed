use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use wgpu_instancing::gpu::{self, GpuInstanceResources};
use wgpu_instancing::{
    init_logging, BaseMesh, Camera, CameraState, InstanceBatchBuilder, InstancingLimits,
    InstancingSettings, RenderNode, Strategy,
};

const DEFAULT_COUNT: usize = 1_000;
const SEED: u64 = 0x1257;

struct DemoArgs {
    /// `None` runs every strategy.
    strategy: Option<Option<Strategy>>,
    count: usize,
    gpu: bool,
}

fn parse_args() -> Result<DemoArgs, String> {
    let mut args = DemoArgs {
        strategy: None,
        count: DEFAULT_COUNT,
        gpu: false,
    };
    let mut positional = 0;
    for arg in std::env::args().skip(1) {
        if arg == "--gpu" {
            args.gpu = true;
            continue;
        }
        match positional {
            0 if arg == "all" => args.strategy = Some(None),
            0 => args.strategy = Some(Some(arg.parse().map_err(|err| format!("{}", err))?)),
            1 => {
                args.count = arg
                    .parse()
                    .map_err(|_| format!("instance count must be a number, got '{}'", arg))?
            }
            _ => return Err(format!("unexpected argument '{}'", arg)),
        }
        positional += 1;
    }
    Ok(args)
}

/// Square grid with a little seeded jitter in placement and spin.
fn jittered_grid(count: usize, rng: &mut SmallRng) -> Vec<Mat4> {
    let side = (count as f32).sqrt().ceil().max(1.0) as usize;
    let spacing = 2.5;
    let offset = (side as f32 - 1.0) * spacing * 0.5;

    (0..count)
        .map(|i| {
            let x = (i % side) as f32 * spacing - offset;
            let z = (i / side) as f32 * spacing - offset;
            let jitter = Vec3::new(rng.gen_range(-0.5..0.5), 0.0, rng.gen_range(-0.5..0.5));
            let spin = Quat::from_rotation_y(rng.gen_range(0.0..std::f32::consts::TAU));
            let scale = Vec3::splat(rng.gen_range(0.5..1.0));
            Mat4::from_scale_rotation_translation(scale, spin, Vec3::new(x, 0.0, z) + jitter)
        })
        .collect()
}

fn report(node: &RenderNode) {
    let bounds = node.bounding_box();
    log::info!(
        "{}: {} instances in {} drawables, ranges {:?}",
        node.strategy(),
        node.instance_count(),
        node.drawable_count(),
        node.batch_ranges()
    );
    if bounds.is_valid() {
        log::info!("  bounds {:?} .. {:?}", bounds.min, bounds.max);
    } else {
        log::info!("  bounds empty");
    }
}

fn run(args: DemoArgs) -> Result<(), String> {
    let mut settings = InstancingSettings::load();

    let device = if args.gpu {
        let (device, queue) =
            pollster::block_on(gpu::request_headless_device()).map_err(|err| err.to_string())?;
        settings = settings.with_limits(InstancingLimits::from_device_limits(&device.limits()));
        Some((device, queue))
    } else {
        None
    };

    let strategies = match args.strategy.unwrap_or(Some(settings.strategy)) {
        Some(strategy) => vec![strategy],
        None => Strategy::ALL.to_vec(),
    };

    let builder = InstanceBatchBuilder::new(settings);
    let mesh = Arc::new(BaseMesh::cube(0.5));
    let mut rng = SmallRng::seed_from_u64(SEED);
    let instances = jittered_grid(args.count, &mut rng);

    let camera = Camera {
        far: 500.0,
        ..Camera::looking_at(Vec3::new(0.0, 40.0, 60.0), Vec3::ZERO)
    };
    let camera_state = CameraState::from_camera(&camera, 16.0 / 9.0);

    for strategy in strategies {
        let mut node = builder
            .build(&mesh, &instances, strategy)
            .map_err(|err| format!("{} build failed: {}", strategy, err))?;
        node.cull(&camera_state);
        report(&node);

        if let Some((device, queue)) = &device {
            let resources = GpuInstanceResources::upload(device, queue, &node);
            resources.write_frame_uniforms(queue, &node);
            if let Some(program) = node.program() {
                program.create_module(device);
            }
        }
    }
    Ok(())
}

fn main() {
    init_logging();

    let result = parse_args().and_then(run);
    if let Err(err) = result {
        log::error!("{}", err);
        eprintln!("usage: instancing-demo [strategy|all] [count] [--gpu]");
        std::process::exit(1);
    }
}
