// crates/gl_physics/src/model.rs

//! 冰盖模型驱动
//!
//! [`IceModel`] 拥有场注册表和各子系统，每一步按固定顺序推进：
//!
//! ```text
//! 气候强迫 -> 质量平衡 -> 几何/掩码 -> 床顶温度 -> SIA 滑动 -> 屈服应力
//!          -> 基岩热层 -> 冰山移除 -> 几何/掩码
//! ```
//!
//! 时间步受基岩热层稳定条件限制。所有公开方法都是集合操作，
//! 组内每个 worker 必须以相同顺序调用。
//!
//! # 注册的场
//!
//! | 名称 | 类型 | 模板宽度 |
//! |------|------|----------|
//! | `land_ice_thickness`, `bedrock_altitude`, `surface_altitude` | f64 | 2 |
//! | `mask` | i32 | 2 |
//! | `enthalpy` | 柱场 (z) | 0 |
//! | `bedtoptemp`, `bheatflx`, `latitude`, `longitude` | f64 | 0 |
//! | `bcflag` | i32 | 0 |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gl_config::{
    BasalResistanceParams, BedrockParams, ClimateParams, Config, EnthalpyParams, GeometryParams,
    SlidingParams, YieldStressParams,
};
use gl_foundation::comm::parallel_section;
use gl_foundation::error::{GlError, GlResult};
use gl_foundation::field::{Field, FieldMeta};
use gl_foundation::grid::{Grid, GridParams};
use gl_foundation::vars::{SharedField, Vars};
use serde::Serialize;
use tracing::{debug, info};

use crate::archive::Archive;
use crate::basal_strength::{yield_stress_model, YieldStress};
use crate::bedrock::BedrockThermalUnit;
use crate::climate::{ClimateFactory, OceanModel, SurfaceModel};
use crate::enthalpy::{enthalpy_converter, EnthalpyConverter};
use crate::iceberg::IcebergRemover;
use crate::mask::{is_floating_ice, is_grounded_ice, is_ice_free_ocean, is_ocean, GeometryCalculator};
use crate::stressbalance::{basal_resistance_law, BasalResistanceLaw, SiaSliding};

/// 单步诊断
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepReport {
    /// 步末时间 [s]
    pub time: f64,
    /// 实际时间步 [s]
    pub dt: f64,
    /// 冰体积 [m3]
    pub ice_volume: f64,
    /// 最大滑动速度 [m s-1]
    pub max_sliding_speed: f64,
    /// 本步移除的冰山单元数
    pub icebergs_removed: u64,
}

/// 注册表中的模型状态场
#[derive(Debug)]
struct StateFields {
    thickness: SharedField<f64>,
    bed: SharedField<f64>,
    surface: SharedField<f64>,
    mask: SharedField<i32>,
    enthalpy: SharedField<f64>,
    bedtoptemp: SharedField<f64>,
    bheatflx: SharedField<f64>,
}

/// 模型私有的诊断与强迫场
#[derive(Debug)]
struct WorkFields {
    mass_flux: Field<f64>,
    ice_surface_temp: Field<f64>,
    shelf_melt: Field<f64>,
    shelf_temp: Field<f64>,
    tauc: Field<f64>,
    beta: Field<f64>,
    upward_flux: Field<f64>,
}

impl WorkFields {
    fn new(grid: &Arc<Grid>) -> GlResult<Self> {
        let scalar = |meta: FieldMeta| Field::scalar(Arc::clone(grid), meta, 0);
        Ok(Self {
            mass_flux: scalar(
                FieldMeta::new("climatic_mass_balance", "surface mass balance", "m s-1")
                    .with_glaciological_units("m year-1"),
            )?,
            ice_surface_temp: scalar(FieldMeta::new("ice_surface_temp", "ice temperature at the ice surface", "K"))?,
            shelf_melt: scalar(
                FieldMeta::new("shelfbmassflux", "ice mass flux from the ice shelf base", "m s-1")
                    .with_glaciological_units("m year-1"),
            )?,
            shelf_temp: scalar(FieldMeta::new("shelfbtemp", "ice temperature at the ice shelf base", "K"))?,
            tauc: scalar(FieldMeta::new("tauc", "yield stress for basal till", "Pa"))?,
            beta: scalar(FieldMeta::new("beta", "basal drag coefficient", "Pa s m-1"))?,
            upward_flux: scalar(FieldMeta::new(
                "heat_flux_from_bedrock",
                "upward geothermal flux at the bedrock surface",
                "W m-2",
            ))?,
        })
    }
}

/// 由配置构造网格参数
pub fn grid_params_from_config(config: &Config) -> GlResult<GridParams> {
    let count = |key: &str| -> GlResult<usize> {
        let value = config.get_integer(key)?;
        usize::try_from(value)
            .map_err(|_| GlError::invalid_config(key, value.to_string(), "必须为非负整数"))
    };
    let mut params = GridParams::new(
        count("grid_Mx")?,
        count("grid_My")?,
        config.get_double("grid_Lx")?,
        config.get_double("grid_Ly")?,
    )
    .with_ice_levels(count("grid_Mz")?, config.get_double("grid_Lz")?);
    params.max_stencil_width = count("grid_max_stencil_width")?;
    params.validate()?;
    Ok(params)
}

/// 冰盖模型
#[derive(Debug)]
pub struct IceModel {
    grid: Arc<Grid>,
    vars: Vars,
    state: StateFields,
    work: WorkFields,
    converter: Arc<dyn EnthalpyConverter>,
    geometry: GeometryParams,
    surface_model: Box<dyn SurfaceModel>,
    ocean_model: Box<dyn OceanModel>,
    sliding: SiaSliding,
    yield_stress: Box<dyn YieldStress>,
    basal_resistance: Box<dyn BasalResistanceLaw>,
    bedrock: BedrockThermalUnit,
    icebergs: Option<IcebergRemover>,
    input_file: Option<PathBuf>,
    time: f64,
    initialized: bool,
}

impl IceModel {
    /// 分配场并构造各子系统
    pub fn new(grid: Arc<Grid>, config: &Config) -> GlResult<Self> {
        config.validate()?;

        let mut vars = Vars::new();
        let state = StateFields {
            thickness: vars.add(Field::scalar(
                Arc::clone(&grid),
                FieldMeta::new("land_ice_thickness", "land ice thickness", "m")
                    .with_standard_name("land_ice_thickness")
                    .with_valid_min(0.0),
                2,
            )?)?,
            bed: vars.add(Field::scalar(
                Arc::clone(&grid),
                FieldMeta::new("bedrock_altitude", "bedrock surface elevation", "m")
                    .with_standard_name("bedrock_altitude"),
                2,
            )?)?,
            surface: vars.add(Field::scalar(
                Arc::clone(&grid),
                FieldMeta::new("surface_altitude", "ice upper surface elevation", "m")
                    .with_standard_name("surface_altitude"),
                2,
            )?)?,
            mask: vars.add(Field::<i32>::scalar(
                Arc::clone(&grid),
                FieldMeta::new("mask", "ice-type (ice-free/grounded/floating/ocean) integer mask", ""),
                2,
            )?)?,
            enthalpy: vars.add(Field::column(
                Arc::clone(&grid),
                FieldMeta::new("enthalpy", "ice enthalpy (includes sensible heat, latent heat, pressure)", "J kg-1"),
                grid.z().to_vec(),
                0,
            )?)?,
            bedtoptemp: vars.add(Field::scalar(
                Arc::clone(&grid),
                FieldMeta::new("bedtoptemp", "temperature at the top surface of the bedrock thermal layer", "K"),
                0,
            )?)?,
            bheatflx: vars.add(Field::scalar(
                Arc::clone(&grid),
                FieldMeta::new("bheatflx", "upward geothermal flux at the bottom of the bedrock thermal layer", "W m-2")
                    .with_glaciological_units("mW m-2"),
                0,
            )?)?,
        };
        vars.add(Field::<f64>::scalar(
            Arc::clone(&grid),
            FieldMeta::new("latitude", "latitude", "degree_north").with_standard_name("latitude"),
            0,
        )?)?;
        vars.add(Field::<f64>::scalar(
            Arc::clone(&grid),
            FieldMeta::new("longitude", "longitude", "degree_east").with_standard_name("longitude"),
            0,
        )?)?;
        vars.add(Field::<i32>::scalar(
            Arc::clone(&grid),
            FieldMeta::new("bcflag", "Dirichlet boundary condition locations", ""),
            0,
        )?)?;
        state.bheatflx.write().set(config.get_double("bootstrapping_geothermal_flux")?);

        let converter = enthalpy_converter(EnthalpyParams::from_config(config)?);
        let climate = ClimateFactory::new(Arc::clone(&grid), ClimateParams::from_config(config)?);
        let surface_model = climate.surface()?;
        let ocean_model = climate.ocean()?;

        let sliding = SiaSliding::new(
            Arc::clone(&grid),
            SlidingParams::from_config(config)?,
            Arc::clone(&converter),
        )?;
        let yield_stress = yield_stress_model(Arc::clone(&grid), YieldStressParams::from_config(config)?)?;
        let basal_resistance = basal_resistance_law(&BasalResistanceParams::from_config(config)?);
        let bedrock = BedrockThermalUnit::new(Arc::clone(&grid), BedrockParams::from_config(config)?)?;
        let icebergs = if config.get_flag("kill_icebergs")? {
            Some(IcebergRemover::new(Arc::clone(&grid))?)
        } else {
            None
        };

        let input_file = Some(config.get_string("input_file")?)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            work: WorkFields::new(&grid)?,
            grid,
            vars,
            state,
            converter,
            geometry: GeometryParams::from_config(config)?,
            surface_model,
            ocean_model,
            sliding,
            yield_stress,
            basal_resistance,
            bedrock,
            icebergs,
            input_file,
            time: 0.0,
            initialized: false,
        })
    }

    /// 网格
    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// 场注册表
    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    /// 可变注册表，用于在 init 前注册 `tillwat`、`tillphi` 等可选场
    pub fn vars_mut(&mut self) -> &mut Vars {
        &mut self.vars
    }

    /// 当前模型时间 [s]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// 焓换算器
    pub fn converter(&self) -> &Arc<dyn EnthalpyConverter> {
        &self.converter
    }

    /// SIA 滑动
    pub fn sliding(&self) -> &SiaSliding {
        &self.sliding
    }

    /// 基岩热层
    pub fn bedrock(&self) -> &BedrockThermalUnit {
        &self.bedrock
    }

    /// 底部屈服应力 [Pa]
    pub fn tauc(&self) -> &Field<f64> {
        &self.work.tauc
    }

    /// 冰/岩界面向上热通量 [W m-2]
    pub fn upward_geothermal_flux(&self) -> &Field<f64> {
        &self.work.upward_flux
    }

    /// 以统一温度填充冰柱焓值，温度不超过各层的压力熔点
    pub fn set_uniform_ice_temperature(&self, temperature: f64) -> GlResult<()> {
        let thickness = self.state.thickness.read();
        let mut enthalpy = self.state.enthalpy.write();
        let levels = enthalpy.levels().to_vec();
        let h = thickness.view();
        let mut e = enthalpy.view_mut();
        for (i, j) in self.grid.points() {
            let thk = h[(i, j)];
            for (k, value) in e.column_mut(i, j).iter_mut().enumerate() {
                let p = self.converter.pressure((thk - levels[k]).max(0.0));
                let t = temperature.min(self.converter.melting_temperature(p));
                *value = self.converter.enthalpy_permissive(t, 0.0, p);
            }
        }
        Ok(())
    }

    /// 初始化（集合操作）
    ///
    /// 有输入归档时先读取其中的状态场；基岩温度柱未能从归档恢复时自举。
    pub fn init(&mut self) -> GlResult<()> {
        let root = self.grid.rank() == 0;
        if let Some(path) = self.input_file.clone() {
            self.read_input(&path)?;
        }

        self.state.thickness.write().update_ghosts()?;
        self.state.bed.write().update_ghosts()?;

        self.surface_model.init(&self.vars)?;
        self.ocean_model.init(&self.vars)?;
        self.update_geometry()?;

        self.sliding.init(&self.vars)?;
        self.yield_stress.init(&self.vars)?;

        self.update_climate(self.time, 0.0)?;
        self.update_bedtoptemp()?;
        if self.bedrock.init(&self.vars)? {
            self.bedrock.bootstrap()?;
        }
        self.bedrock.upward_geothermal_flux(&mut self.work.upward_flux)?;

        if let Some(remover) = self.icebergs.as_mut() {
            remover.init(&self.vars)?;
        }

        if root {
            info!(
                "模型初始化完成: {}x{} 网格, {} 个 worker, t = {} s",
                self.grid.mx(),
                self.grid.my(),
                self.grid.size(),
                self.time
            );
        }
        self.initialized = true;
        Ok(())
    }

    fn read_input(&mut self, path: &Path) -> GlResult<()> {
        if self.grid.rank() == 0 {
            info!("从 {} 读取模型状态", path.display());
        }
        let archive = Archive::open(path)?;
        let fields = [
            &self.state.thickness,
            &self.state.bed,
            &self.state.enthalpy,
            &self.state.bheatflx,
        ];
        for shared in fields {
            let mut field = shared.write();
            let name = field.name().to_string();
            if archive.inq_var(&name) {
                let n = archive.n_records(&name)?;
                if n > 0 {
                    archive.read_column_variable(&mut field, n - 1)?;
                }
            }
        }

        if archive.inq_var("tillphi") && !self.vars.contains("tillphi") {
            let mut phi = Field::scalar(
                Arc::clone(&self.grid),
                FieldMeta::new("tillphi", "friction angle for till under grounded ice sheet", "degrees"),
                0,
            )?;
            let n = archive.n_records("tillphi")?;
            if n > 0 {
                archive.read_column_variable(&mut phi, n - 1)?;
                self.vars.add(phi)?;
            }
        }

        if let Some(&t) = archive.time.last() {
            self.time = t;
        }
        Ok(())
    }

    fn update_climate(&mut self, t: f64, dt: f64) -> GlResult<()> {
        self.surface_model.update(t, dt)?;
        self.ocean_model.update(t, dt)?;
        self.surface_model.mass_flux(&mut self.work.mass_flux)?;
        self.surface_model.temperature(&mut self.work.ice_surface_temp)?;
        self.ocean_model.shelf_base_mass_flux(&mut self.work.shelf_melt)?;
        self.ocean_model.shelf_base_temperature(&mut self.work.shelf_temp)
    }

    /// 重新计算掩码和冰面，并把海平面传给屈服应力模型
    fn update_geometry(&mut self) -> GlResult<()> {
        let sea_level = self.ocean_model.sea_level_elevation();
        self.yield_stress.set_sea_level(sea_level);
        let calculator = GeometryCalculator::new(&self.geometry, sea_level);

        let bed = self.state.bed.read();
        let thickness = self.state.thickness.read();
        let mut mask = self.state.mask.write();
        let mut surface = self.state.surface.write();
        calculator.compute(&bed, &thickness, &mut mask, &mut surface)
    }

    /// 显式质量平衡：冰面质量通量减去冰架底部融化，厚度不小于零
    fn update_thickness(&self, dt: f64) -> GlResult<()> {
        let mask = self.state.mask.read();
        let mut thickness = self.state.thickness.write();
        {
            let m = mask.view();
            let smb = self.work.mass_flux.view();
            let melt = self.work.shelf_melt.view();
            let mut h = thickness.view_mut();
            for (i, j) in self.grid.points() {
                let value = m[(i, j)];
                if is_ice_free_ocean(value) {
                    continue;
                }
                let mut rate = smb[(i, j)];
                if is_floating_ice(value) {
                    rate -= melt[(i, j)];
                }
                h[(i, j)] = (h[(i, j)] + dt * rate).max(0.0);
            }
        }
        thickness.update_ghosts()
    }

    /// 床顶温度：接地冰取冰底温度，海洋单元取冰架底部温度，其余取冰面温度
    fn update_bedtoptemp(&self) -> GlResult<()> {
        let thickness = self.state.thickness.read();
        let mask = self.state.mask.read();
        let enthalpy = self.state.enthalpy.read();
        let mut top = self.state.bedtoptemp.write();

        let converter = Arc::clone(&self.converter);
        let grid = Arc::clone(&self.grid);
        let work = &self.work;
        parallel_section(grid.comm().as_ref(), || {
            let h = thickness.view();
            let m = mask.view();
            let e = enthalpy.view();
            let surface_temp = work.ice_surface_temp.view();
            let shelf_temp = work.shelf_temp.view();
            let mut out = top.view_mut();
            for (i, j) in grid.points() {
                let value = m[(i, j)];
                out[(i, j)] = if is_grounded_ice(value) {
                    let p = converter.pressure(h[(i, j)]);
                    converter.temperature(e.column(i, j)[0], p)?
                } else if is_ocean(value) {
                    shelf_temp[(i, j)]
                } else {
                    surface_temp[(i, j)]
                };
            }
            Ok(())
        })
    }

    fn update_basal_drag(&mut self) {
        let tauc = self.work.tauc.view();
        let velocity = self.sliding.velocity().view();
        let mut beta = self.work.beta.view_mut();
        for (i, j) in self.grid.points() {
            let v = velocity[(i, j)];
            beta[(i, j)] = self.basal_resistance.drag(tauc[(i, j)], v.x, v.y);
        }
    }

    /// 推进一步（集合操作）
    ///
    /// 实际时间步取 `max_dt` 与基岩热层稳定上限的较小值。
    pub fn step(&mut self, max_dt: f64) -> GlResult<StepReport> {
        if !self.initialized {
            return Err(GlError::contract("IceModel::step 之前必须调用 init"));
        }
        if max_dt.is_nan() || max_dt <= 0.0 {
            return Err(GlError::invalid_input(format!("时间步必须为正: dt = {max_dt} s")));
        }
        let dt = self
            .bedrock
            .max_timestep()
            .map_or(max_dt, |limit| max_dt.min(limit));
        let t = self.time;

        self.update_climate(t, dt)?;
        self.update_thickness(dt)?;
        self.update_geometry()?;
        self.update_bedtoptemp()?;

        self.sliding.update()?;

        self.yield_stress.update(t, dt)?;
        self.yield_stress
            .basal_material_yield_stress(&mut self.work.tauc)?;
        self.update_basal_drag();

        self.bedrock.update(t, dt)?;
        self.bedrock
            .upward_geothermal_flux(&mut self.work.upward_flux)?;

        let icebergs_removed = match self.icebergs.as_mut() {
            Some(remover) => {
                let mut mask = self.state.mask.write();
                let mut thickness = self.state.thickness.write();
                remover.update(&mut mask, &mut thickness)?
            }
            None => 0,
        };
        self.update_geometry()?;

        self.time = t + dt;
        let report = StepReport {
            time: self.time,
            dt,
            ice_volume: self.state.thickness.read().global_sum() * self.grid.cell_area(),
            max_sliding_speed: self.sliding.velocity().global_max_magnitude(),
            icebergs_removed,
        };
        if self.grid.rank() == 0 {
            debug!("{:?}", report);
        }
        Ok(report)
    }

    /// 写出模型状态（集合操作，只有 worker 0 写文件）
    pub fn write_archive(&self, path: &Path) -> GlResult<()> {
        let mut archive = Archive::new();
        archive.set_attribute("source", concat!("gl_physics ", env!("CARGO_PKG_VERSION")));
        archive.set_attribute("surface_gradient_method", self.sliding.method().to_string());
        archive.set_attribute("yield_stress_model", self.yield_stress.name());
        archive.append_time(self.time);

        for shared in [
            &self.state.thickness,
            &self.state.bed,
            &self.state.surface,
            &self.state.bedtoptemp,
            &self.state.bheatflx,
        ] {
            archive.write_column_variable(&shared.read(), None)?;
        }
        archive.write_column_variable(&self.state.enthalpy.read(), Some("z"))?;
        archive.write_column_variable(&self.state.mask.read(), None)?;

        let mut speed = Field::scalar(
            Arc::clone(&self.grid),
            FieldMeta::new("velbase_sliding_mag", "magnitude of the basal sliding velocity", "m s-1")
                .with_glaciological_units("m year-1"),
            0,
        )?;
        {
            let velocity = self.sliding.velocity().view();
            let mut out = speed.view_mut();
            for (i, j) in self.grid.points() {
                out[(i, j)] = velocity[(i, j)].length();
            }
        }
        for field in [
            &speed,
            self.sliding.basal_frictional_heating(),
            &self.work.tauc,
            &self.work.beta,
            &self.work.upward_flux,
            &self.work.mass_flux,
        ] {
            archive.write_column_variable(field, None)?;
        }
        self.bedrock.write_variables(&mut archive)?;
        self.yield_stress.write_variables(&mut archive)?;

        let root = self.grid.rank() == 0;
        parallel_section(self.grid.comm().as_ref(), || {
            if root {
                archive.save(path)?;
                info!("写出 {} (t = {} s)", path.display(), self.time);
            }
            Ok(())
        })
    }
}
