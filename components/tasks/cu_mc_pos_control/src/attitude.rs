use cu_vehicle_payloads::AttitudeSetpoint;
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

const MIN_THRUST: f32 = f32::EPSILON;

/// Attitude that aligns the body z axis against `thrust` (NED) with the nose towards `yaw`.
pub fn thrust_to_attitude(thrust: &Vector3<f32>, yaw: f32) -> AttitudeSetpoint {
    let body_z = if thrust.norm_squared() > MIN_THRUST {
        -thrust.normalize()
    } else {
        // no thrust: level
        Vector3::z()
    };

    // vector of desired yaw direction in the horizontal plane
    let y_c = Vector3::new(-yaw.sin(), yaw.cos(), 0.0);

    let body_x = if body_z.z.abs() > 1e-6 {
        let x = y_c.cross(&body_z);
        // keep the nose forward when flying upside down
        let x = if body_z.z < 0.0 { -x } else { x };
        x.normalize()
    } else {
        // thrust in the horizontal plane, point the nose down
        Vector3::z()
    };
    let body_y = body_z.cross(&body_x);

    let rotation = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[body_x, body_y, body_z]));
    let (roll, pitch, yaw_body) = rotation.euler_angles();
    let q = UnitQuaternion::from_rotation_matrix(&rotation);

    AttitudeSetpoint {
        roll_body: roll,
        pitch_body: pitch,
        yaw_body,
        q_d: quaternion_array(&q),
        q_d_valid: true,
        thrust: thrust.norm(),
        ..Default::default()
    }
}

/// Level attitude, nose towards `yaw`, no thrust.
pub fn idle_attitude(yaw: f32) -> AttitudeSetpoint {
    let q = UnitQuaternion::from_euler_angles(0.0, 0.0, yaw);
    AttitudeSetpoint {
        roll_body: 0.0,
        pitch_body: 0.0,
        yaw_body: yaw,
        yaw_sp_move_rate: 0.0,
        q_d: quaternion_array(&q),
        q_d_valid: true,
        thrust: 0.0,
        ..Default::default()
    }
}

/// (w, x, y, z)
fn quaternion_array(q: &UnitQuaternion<f32>) -> [f32; 4] {
    let q = q.quaternion();
    [q.w, q.i, q.j, q.k]
}
